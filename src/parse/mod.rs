mod lexer;
mod parser;
mod token;

pub use lexer::{Lexer, Tag};
pub use parser::*;
pub use token::Token;
