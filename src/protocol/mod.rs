use anyhow::{anyhow, bail, Result};

/// Status byte opening every transfer envelope
pub const STATUS_OK: u8 = 0;
pub const STATUS_ERR: u8 = 1;
pub const STATUS_APPEND: u8 = 2;

/// Largest chunk payload the transfer engine puts into one frame
pub const CHUNK_SIZE: usize = 4096;

/// Commands understood on both ends of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Echo,
    Time,
    Exit,
    Download,
    Upload,
}

impl Command {
    /// Parse an already case-folded token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ECHO" => Some(Command::Echo),
            "TIME" => Some(Command::Time),
            "EXIT" => Some(Command::Exit),
            "DOWNLOAD" => Some(Command::Download),
            "UPLOAD" => Some(Command::Upload),
            _ => None,
        }
    }
}

/// One line of input split into command token and argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// First token of the line, upper-cased
    pub token: String,
    /// Rest of the line, trimmed; may itself contain whitespace
    pub arg: String,
}

impl Request {
    /// Split on the first run of whitespace. Unrecognized tokens are
    /// kept as-is here; they only become errors at dispatch.
    pub fn parse(line: &str) -> Self {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let token = parts.next().unwrap_or("").to_uppercase();
        let arg = parts.next().unwrap_or("").trim().to_string();
        Self { token, arg }
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_token(&self.token)
    }
}

/// Transfer setup reply; the first payload byte selects the arm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Fresh transfer, full size follows
    Ok { size: u64 },

    /// Transfer refused, human-readable reason follows
    Err { message: String },

    /// Resume: the receiver already holds a prefix. For downloads the
    /// size is the full file size; for uploads it is the receiver's
    /// partial size.
    Append { size: u64 },
}

impl Status {
    /// Serialize into a frame payload
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Status::Ok { size } => {
                let mut bytes = vec![STATUS_OK];
                bytes.extend_from_slice(&size.to_be_bytes());
                bytes
            }
            Status::Append { size } => {
                let mut bytes = vec![STATUS_APPEND];
                bytes.extend_from_slice(&size.to_be_bytes());
                bytes
            }
            Status::Err { message } => {
                let mut bytes = vec![STATUS_ERR];
                bytes.extend_from_slice(message.as_bytes());
                bytes
            }
        }
    }

    /// Deserialize from a frame payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (&status, rest) = data
            .split_first()
            .ok_or_else(|| anyhow!("empty status envelope"))?;
        match status {
            STATUS_OK => Ok(Status::Ok { size: decode_size(rest)? }),
            STATUS_APPEND => Ok(Status::Append { size: decode_size(rest)? }),
            STATUS_ERR => Ok(Status::Err {
                message: String::from_utf8_lossy(rest).into_owned(),
            }),
            other => bail!("unknown status byte: {}", other),
        }
    }
}

/// Encode a byte count as an 8-byte size frame payload
pub fn encode_size(size: u64) -> [u8; 8] {
    size.to_be_bytes()
}

/// Decode an 8-byte big-endian size frame payload
pub fn decode_size(data: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = data
        .try_into()
        .map_err(|_| anyhow!("size field must be 8 bytes, got {}", data.len()))?;
    Ok(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_lines() {
        let request = Request::parse("echo hello world");
        assert_eq!(request.token, "ECHO");
        assert_eq!(request.arg, "hello world");
        assert_eq!(request.command(), Some(Command::Echo));

        let request = Request::parse("  TIME  ");
        assert_eq!(request.token, "TIME");
        assert_eq!(request.arg, "");

        let request = Request::parse("download my file.txt");
        assert_eq!(request.command(), Some(Command::Download));
        assert_eq!(request.arg, "my file.txt");

        let request = Request::parse("FOO bar");
        assert_eq!(request.command(), None);
        assert_eq!(request.token, "FOO");
    }

    #[test]
    fn test_status_roundtrip() {
        let cases = [
            Status::Ok { size: 0 },
            Status::Ok { size: u64::MAX },
            Status::Append { size: 4096 },
            Status::Err { message: "File 'x' not found.".to_string() },
        ];
        for status in cases {
            let bytes = status.to_bytes();
            assert_eq!(Status::from_bytes(&bytes).unwrap(), status);
        }
    }

    #[test]
    fn test_status_wire_layout() {
        let bytes = Status::Ok { size: 258 }.to_bytes();
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[0], STATUS_OK);
        assert_eq!(&bytes[1..], &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_status_rejects_garbage() {
        assert!(Status::from_bytes(&[]).is_err());
        assert!(Status::from_bytes(&[9, 1, 2]).is_err());
        // OK arm with a short size field
        assert!(Status::from_bytes(&[STATUS_OK, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_size_roundtrip() {
        for size in [0u64, 1, 4096, u64::MAX] {
            assert_eq!(decode_size(&encode_size(size)).unwrap(), size);
        }
        assert!(decode_size(&[0; 7]).is_err());
        assert!(decode_size(&[0; 9]).is_err());
    }
}
