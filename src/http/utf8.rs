use std::borrow::Cow;
use std::string::FromUtf8Error;

pub const SLASH: u8 = b'/';
pub const QMARK: u8 = b'?';
pub const COLON: u8 = b':';
pub const EQUALS: u8 = b'=';
pub const AMPERSAND: u8 = b'&';

pub trait UTF8 {
    fn utf8(&self) -> Result<String, FromUtf8Error>;
    fn utf8_lossy(&self) -> Cow<str>;
}

impl UTF8 for [u8] {
    fn utf8(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.to_vec())
    }
    fn utf8_lossy(&self) -> Cow<str> {
        String::from_utf8_lossy(self)
    }
}

impl UTF8 for Vec<u8> {
    fn utf8(&self) -> Result<String, FromUtf8Error> {
        String::from_utf8(self.clone())
    }
    fn utf8_lossy(&self) -> Cow<str> {
        String::from_utf8_lossy(self)
    }
}
