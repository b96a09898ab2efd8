pub mod bencode;
pub mod logger;
pub mod validator;
