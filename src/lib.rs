//! An adaptive LL(*) parsing/lexing runtime: the ATN graph, a deserializer
//! for its wire format, the generic prediction-context algebra, and two
//! simulators — `ParserATNSimulator` for adaptive rule-prediction with
//! SLL→LL fallback, and `LexerATNSimulator` for longest-match token
//! recognition — that walk it. What calls this runtime (the generated
//! parser/lexer, the input stream, error reporting) is left as a trait
//! seam in [`recognizer`].

pub mod atn;
pub mod config;
pub mod config_set;
pub mod context;
pub mod deserializer;
pub mod dfa;
pub mod error;
pub mod index;
pub mod interval_set;
pub mod lexer_sim;
pub mod ll1_analyzer;
pub mod parser_sim;
pub mod prediction_mode;
pub mod recognizer;
pub mod semantic_context;
pub mod trace;

pub use atn::{GrammarType, RuleInfo, ATN};
pub use config::{ATNConfig, LexerATNConfig};
pub use config_set::{ATNConfigSet, ConfigSet, LexerATNConfigSet};
pub use context::PredictionContext;
pub use deserializer::deserialize;
pub use dfa::DFA;
pub use error::{ATNDeserializeError, LexerNoViableAltError, NoViableAltError};
pub use index::{DecisionIndex, RuleIndex, StateIndex, TokenType, EOF};
pub use lexer_sim::{LexerATNSimulator, LexerMatchResult};
pub use parser_sim::ParserATNSimulator;
pub use recognizer::{CharStream, ErrorListener, ErrorStrategy, IntStream, Recognizer, TokenStream};
