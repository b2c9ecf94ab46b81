pub mod delimited;
pub mod eeg;
pub mod text;
