//! Text messages exchanged with the companion UDP server.
//!
//! Every datagram is `<operation>>><content>`, e.g. `req>>alive`, `alive>>yes`,
//! `time>>2023/5/1 10:30`, `id>>door-01`, `ack>>ok`.

use core::fmt;

use time::{Date, Month, PrimitiveDateTime, Time};

pub const DELIMITER: &str = ">>";

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("expected exactly one `>>` delimiter")]
    Delimiter,
    #[error("malformed time value {0:?}")]
    InvalidTime(String),
}

/// A datagram split into operation keyword and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub operation: &'a str,
    pub content: &'a str,
}

impl<'a> Message<'a> {
    pub fn parse(text: &'a str) -> Result<Self, MessageError> {
        let (operation, content) = text.split_once(DELIMITER).ok_or(MessageError::Delimiter)?;
        if content.contains(DELIMITER) {
            return Err(MessageError::Delimiter);
        }
        Ok(Self { operation, content })
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.operation, self.content)
    }
}

/// Something the node sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Time,
    Alive,
    Id(String),
    Msg(String),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Time => write!(f, "req{DELIMITER}time"),
            Request::Alive => write!(f, "req{DELIMITER}alive"),
            Request::Id(id) => write!(f, "id{DELIMITER}{id}"),
            Request::Msg(msg) => write!(f, "msg{DELIMITER}{msg}"),
        }
    }
}

/// Something the server sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Time(PrimitiveDateTime),
    Alive(String),
    Ack(String),
    /// Well-formed but not an operation this node acts on.
    Other { operation: String, content: String },
}

impl Reply {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let msg = Message::parse(text)?;
        Ok(match msg.operation {
            "time" => Reply::Time(parse_time(msg.content)?),
            "alive" => Reply::Alive(msg.content.to_owned()),
            "ack" => Reply::Ack(msg.content.to_owned()),
            other => Reply::Other {
                operation: other.to_owned(),
                content: msg.content.to_owned(),
            },
        })
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Time(at) => write!(f, "time{DELIMITER}{}", format_time(*at)),
            Reply::Alive(content) => write!(f, "alive{DELIMITER}{content}"),
            Reply::Ack(content) => write!(f, "ack{DELIMITER}{content}"),
            Reply::Other { operation, content } => write!(f, "{operation}{DELIMITER}{content}"),
        }
    }
}

/// Parses `Y/M/D H:M`. Fields are plain decimal and need not be zero padded.
pub fn parse_time(text: &str) -> Result<PrimitiveDateTime, MessageError> {
    let invalid = || MessageError::InvalidTime(text.to_owned());

    let (date, clock) = text.trim().split_once(' ').ok_or_else(invalid)?;
    let mut ymd = date.split('/');
    let mut hm = clock.trim().split(':');
    let year: i32 = next_field(&mut ymd).ok_or_else(invalid)?;
    let month: u8 = next_field(&mut ymd).ok_or_else(invalid)?;
    let day: u8 = next_field(&mut ymd).ok_or_else(invalid)?;
    let hour: u8 = next_field(&mut hm).ok_or_else(invalid)?;
    let minute: u8 = next_field(&mut hm).ok_or_else(invalid)?;
    if ymd.next().is_some() || hm.next().is_some() {
        return Err(invalid());
    }

    let month = Month::try_from(month).map_err(|_| invalid())?;
    let date = Date::from_calendar_date(year, month, day).map_err(|_| invalid())?;
    let time = Time::from_hms(hour, minute, 0).map_err(|_| invalid())?;
    Ok(PrimitiveDateTime::new(date, time))
}

/// Renders `Y/M/D H:M` without zero padding.
pub fn format_time(at: PrimitiveDateTime) -> String {
    format!(
        "{}/{}/{} {}:{}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute()
    )
}

fn next_field<'a, T: core::str::FromStr>(parts: &mut impl Iterator<Item = &'a str>) -> Option<T> {
    parts.next()?.parse().ok()
}
