pub mod matching;
pub mod ws;
