//! bencode 编解码，用于恢复数据与会话状态的序列化

use std::collections::BTreeMap;
use thiserror::Error;

/// 一个 bencode 值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

/// 解码错误，每种错误对应一个非零状态码
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BencodeError {
    #[error("数据意外结束 (位置 {0})")]
    UnexpectedEnd(usize),
    #[error("非法字节 0x{byte:02x} (位置 {position})")]
    UnexpectedByte { byte: u8, position: usize },
    #[error("非法整数 (位置 {0})")]
    InvalidInteger(usize),
    #[error("非法字符串长度 (位置 {0})")]
    InvalidLength(usize),
    #[error("存在多余数据 (位置 {0})")]
    TrailingData(usize),
    #[error("嵌套层数过深 (位置 {0})")]
    TooDeep(usize),
}

impl BencodeError {
    /// 与引擎解码器一致的状态码，0 表示成功，因此这里总是非零
    pub fn code(&self) -> i32 {
        match self {
            BencodeError::UnexpectedEnd(_) => 1,
            BencodeError::UnexpectedByte { .. } => 2,
            BencodeError::InvalidInteger(_) => 3,
            BencodeError::InvalidLength(_) => 4,
            BencodeError::TrailingData(_) => 5,
            BencodeError::TooDeep(_) => 6,
        }
    }
}

const MAX_DEPTH: usize = 64;

impl Value {
    pub fn string(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }

    pub fn integer(i: i64) -> Self {
        Self::Integer(i)
    }

    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    pub fn dict() -> Self {
        Self::Dict(BTreeMap::new())
    }

    /// 向列表追加元素（builder 风格）
    pub fn push(mut self, value: Value) -> Self {
        if let Self::List(ref mut list) = self {
            list.push(value);
        }
        self
    }

    /// 向字典插入键值对（builder 风格）
    pub fn insert(mut self, key: &str, value: Value) -> Self {
        if let Self::Dict(ref mut dict) = self {
            dict.insert(key.as_bytes().to_vec(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Dict(dict) => dict.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Integer(i) => {
                buf.push(b'i');
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.push(b'e');
            }
            Self::Bytes(bytes) => encode_bytes(bytes, buf),
            Self::List(list) => {
                buf.push(b'l');
                for item in list {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            Self::Dict(dict) => {
                buf.push(b'd');
                // BTreeMap 保证键有序
                for (key, value) in dict {
                    encode_bytes(key, buf);
                    value.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }

    /// 解码一段完整的 bencode 数据，不允许尾随字节
    pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
        let mut parser = Parser { input, position: 0 };
        let value = parser.parse_value(0)?;
        if parser.position != input.len() {
            return Err(BencodeError::TrailingData(parser.position));
        }
        Ok(value)
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

struct Parser<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.position)
            .copied()
            .ok_or(BencodeError::UnexpectedEnd(self.position))
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > MAX_DEPTH {
            return Err(BencodeError::TooDeep(self.position));
        }
        match self.peek()? {
            b'i' => {
                self.position += 1;
                let value = self.parse_integer(b'e')?;
                Ok(Value::Integer(value))
            }
            b'l' => {
                self.position += 1;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.parse_value(depth + 1)?);
                }
                self.position += 1;
                Ok(Value::List(list))
            }
            b'd' => {
                self.position += 1;
                let mut dict = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = self.parse_bytes()?;
                    let value = self.parse_value(depth + 1)?;
                    dict.insert(key, value);
                }
                self.position += 1;
                Ok(Value::Dict(dict))
            }
            b'0'..=b'9' => Ok(Value::Bytes(self.parse_bytes()?)),
            byte => Err(BencodeError::UnexpectedByte {
                byte,
                position: self.position,
            }),
        }
    }

    fn parse_integer(&mut self, terminator: u8) -> Result<i64, BencodeError> {
        let start = self.position;
        let end = self.input[start..]
            .iter()
            .position(|&b| b == terminator)
            .map(|offset| start + offset)
            .ok_or(BencodeError::UnexpectedEnd(self.input.len()))?;
        let digits = std::str::from_utf8(&self.input[start..end])
            .map_err(|_| BencodeError::InvalidInteger(start))?;
        let well_formed = !digits.is_empty()
            && digits != "-"
            && digits != "-0"
            && !(digits.len() > 1 && digits.starts_with('0'))
            && !digits.starts_with("-0");
        if !well_formed {
            return Err(BencodeError::InvalidInteger(start));
        }
        let value = digits
            .parse::<i64>()
            .map_err(|_| BencodeError::InvalidInteger(start))?;
        self.position = end + 1;
        Ok(value)
    }

    fn parse_bytes(&mut self) -> Result<Vec<u8>, BencodeError> {
        let start = self.position;
        if !self.peek()?.is_ascii_digit() {
            return Err(BencodeError::InvalidLength(start));
        }
        let length = self.parse_integer(b':')?;
        let length = usize::try_from(length).map_err(|_| BencodeError::InvalidLength(start))?;
        let end = self
            .position
            .checked_add(length)
            .filter(|&end| end <= self.input.len())
            .ok_or(BencodeError::UnexpectedEnd(self.input.len()))?;
        let bytes = self.input[self.position..end].to_vec();
        self.position = end;
        Ok(bytes)
    }
}
