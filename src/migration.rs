use thiserror::Error;

pub(crate) const RECORD_TAG: u8 = 0x0A;
pub(crate) const SENTINEL_TAG: u8 = 0x10;

const SECRET_TAG: u8 = 0x0A;
const ACCOUNT_TAG: u8 = 0x12;
const ISSUER_TAG: u8 = 0x1A;
const ALGORITHM_TAG: u8 = 0x20;
const DIGITS_TAG: u8 = 0x28;
const KIND_TAG: u8 = 0x30;
const COUNTER_TAG: u8 = 0x38;

// Trailer after the sentinel
const VERSION_TAG: u8 = 0x10;
const BATCH_SIZE_TAG: u8 = 0x18;
const BATCH_INDEX_TAG: u8 = 0x20;
const BATCH_ID_TAG: u8 = 0x28;

const MAX_VARINT_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid header at offset {offset}: expected 0x0a, got {}", describe_byte(.found))]
    InvalidHeader { offset: usize, found: Option<u8> },
    #[error("payload truncated at offset {offset}: needed {needed} more bytes")]
    TruncatedPayload { offset: usize, needed: usize },
    #[error("record at offset {offset} has no {missing}")]
    IncompleteRecord { offset: usize, missing: &'static str },
    #[error("account at offset {offset} is not valid UTF-8")]
    InvalidAccountEncoding { offset: usize },
    #[error("issuer at offset {offset} is not valid UTF-8")]
    InvalidIssuerEncoding { offset: usize },
    #[error("unrecognized field tag {tag:#04x} at offset {offset}")]
    UnrecognizedFieldTag { offset: usize, tag: u8 },
    #[error("varint at offset {offset} is longer than 10 bytes")]
    MalformedVarint { offset: usize },
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

fn describe_byte(found: &Option<u8>) -> String {
    match found {
        Some(byte) => format!("{byte:#04x}"),
        None => "end of payload".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Unspecified,
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl Algorithm {
    fn from_wire(value: u64) -> Self {
        match value {
            1 => Algorithm::Sha1,
            2 => Algorithm::Sha256,
            3 => Algorithm::Sha512,
            4 => Algorithm::Md5,
            0 => Algorithm::Unspecified,
            other => {
                tracing::warn!(value = other, "unknown algorithm value, treating as unspecified");
                Algorithm::Unspecified
            }
        }
    }

    pub fn uri_name(self) -> &'static str {
        match self {
            Algorithm::Unspecified | Algorithm::Sha1 => "SHA1",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha512 => "SHA512",
            Algorithm::Md5 => "MD5",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Digits {
    #[default]
    Unspecified,
    Six,
    Eight,
}

impl Digits {
    fn from_wire(value: u64) -> Self {
        match value {
            1 => Digits::Six,
            2 => Digits::Eight,
            0 => Digits::Unspecified,
            other => {
                tracing::warn!(value = other, "unknown digit count, treating as unspecified");
                Digits::Unspecified
            }
        }
    }

    pub fn count(self) -> usize {
        match self {
            Digits::Eight => 8,
            Digits::Unspecified | Digits::Six => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtpKind {
    #[default]
    Unspecified,
    Hotp,
    Totp,
}

impl OtpKind {
    fn from_wire(value: u64) -> Self {
        match value {
            1 => OtpKind::Hotp,
            2 => OtpKind::Totp,
            0 => OtpKind::Unspecified,
            other => {
                tracing::warn!(value = other, "unknown otp type, treating as unspecified");
                OtpKind::Unspecified
            }
        }
    }

    pub fn uri_name(self) -> &'static str {
        match self {
            OtpKind::Hotp => "hotp",
            OtpKind::Unspecified | OtpKind::Totp => "totp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub secret: Vec<u8>,
    pub account: String,
    pub issuer: String,
    pub algorithm: Algorithm,
    pub digits: Digits,
    pub kind: OtpKind,
    pub counter: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationBatch {
    pub records: Vec<OtpRecord>,
    pub version: u64,
    pub batch_size: u64,
    pub batch_index: u64,
    pub batch_id: i32,
}

// Offsets are absolute positions in the payload
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self::at(bytes, 0)
    }

    fn at(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, pos: 0, base }
    }

    fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn byte(&mut self) -> Result<u8, DecodeError> {
        let byte = self.peek().ok_or(DecodeError::TruncatedPayload {
            offset: self.offset(),
            needed: 1,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let start = self.offset();
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.byte()?;
            value |= ((byte & 0x7f) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::MalformedVarint { offset: start })
    }

    fn length(&mut self) -> Result<usize, DecodeError> {
        let offset = self.offset();
        let len = self.varint()?;
        usize::try_from(len).map_err(|_| DecodeError::TruncatedPayload {
            offset,
            needed: usize::MAX,
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if len > remaining {
            return Err(DecodeError::TruncatedPayload {
                offset: self.offset(),
                needed: len - remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

// Records up to the 0x10 sentinel; anything after it is ignored
pub fn decode(payload: &[u8]) -> Result<Vec<OtpRecord>, DecodeError> {
    let mut cursor = Cursor::new(payload);
    decode_records(&mut cursor)
}

pub fn decode_batch(payload: &[u8]) -> Result<MigrationBatch, DecodeError> {
    let mut cursor = Cursor::new(payload);
    let records = decode_records(&mut cursor)?;
    let mut batch = MigrationBatch {
        records,
        ..MigrationBatch::default()
    };

    while !cursor.is_empty() {
        let offset = cursor.offset();
        match cursor.byte()? {
            VERSION_TAG => batch.version = cursor.varint()?,
            BATCH_SIZE_TAG => batch.batch_size = cursor.varint()?,
            BATCH_INDEX_TAG => batch.batch_index = cursor.varint()?,
            // int32 on the wire, negative values are sign-extended to ten bytes
            BATCH_ID_TAG => batch.batch_id = cursor.varint()? as i32,
            tag => return Err(DecodeError::UnrecognizedFieldTag { offset, tag }),
        }
    }

    Ok(batch)
}

fn decode_records(cursor: &mut Cursor<'_>) -> Result<Vec<OtpRecord>, DecodeError> {
    let mut records = Vec::new();

    loop {
        let offset = cursor.offset();
        match cursor.peek() {
            Some(RECORD_TAG) => {}
            found => return Err(DecodeError::InvalidHeader { offset, found }),
        }
        cursor.pos += 1;

        let entry_len = cursor.length()?;
        let body_offset = cursor.offset();
        let body = cursor.take(entry_len)?;
        let record = decode_record(Cursor::at(body, body_offset), offset)?;
        tracing::debug!(offset, entry_len, account = %record.account, "decoded record");
        records.push(record);

        match cursor.peek() {
            None | Some(SENTINEL_TAG) => break,
            Some(_) => continue,
        }
    }

    Ok(records)
}

fn decode_record(mut cursor: Cursor<'_>, record_offset: usize) -> Result<OtpRecord, DecodeError> {
    let mut secret = None;
    let mut account = None;
    let mut issuer = None;
    let mut algorithm = Algorithm::default();
    let mut digits = Digits::default();
    let mut kind = OtpKind::default();
    let mut counter = 0;

    while !cursor.is_empty() {
        let offset = cursor.offset();
        let tag = cursor.byte()?;
        match tag {
            SECRET_TAG => {
                let len = cursor.length()?;
                secret = Some(cursor.take(len)?.to_vec());
            }
            ACCOUNT_TAG => {
                let len = cursor.length()?;
                let data = cursor.take(len)?;
                let text = std::str::from_utf8(data)
                    .map_err(|_| DecodeError::InvalidAccountEncoding { offset })?;
                account = Some(text.to_string());
            }
            ISSUER_TAG => {
                let len = cursor.length()?;
                let data = cursor.take(len)?;
                let text = std::str::from_utf8(data)
                    .map_err(|_| DecodeError::InvalidIssuerEncoding { offset })?;
                issuer = Some(text.to_string());
            }
            ALGORITHM_TAG => algorithm = Algorithm::from_wire(cursor.varint()?),
            DIGITS_TAG => digits = Digits::from_wire(cursor.varint()?),
            KIND_TAG => kind = OtpKind::from_wire(cursor.varint()?),
            COUNTER_TAG => counter = cursor.varint()?,
            _ => return Err(DecodeError::UnrecognizedFieldTag { offset, tag }),
        }
        tracing::trace!(offset, tag, "decoded field");
    }

    let missing = |missing| DecodeError::IncompleteRecord {
        offset: record_offset,
        missing,
    };

    Ok(OtpRecord {
        secret: secret.ok_or_else(|| missing("secret"))?,
        account: account.ok_or_else(|| missing("account"))?,
        issuer: issuer.ok_or_else(|| missing("issuer"))?,
        algorithm,
        digits,
        kind,
        counter,
    })
}
