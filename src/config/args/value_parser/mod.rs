pub mod regex;
pub mod url;
