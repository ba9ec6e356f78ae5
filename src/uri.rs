use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::base32::base32_encode;
use crate::migration::{OtpKind, OtpRecord};

pub(crate) const PERIOD: u64 = 30;

// Only what would break the path or query; ':' and '@' stay readable.
const LABEL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

// otpauth://totp/ACCOUNT?secret=BASE32&issuer=ISSUER&algorithm=SHA1&digits=6&period=30
pub fn provisioning_uri(record: &OtpRecord) -> String {
    let mut uri = format!(
        "otpauth://{}/{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
        record.kind.uri_name(),
        utf8_percent_encode(&record.account, LABEL),
        base32_encode(&record.secret),
        utf8_percent_encode(&record.issuer, LABEL),
        record.algorithm.uri_name(),
        record.digits.count(),
        PERIOD,
    );

    if record.kind == OtpKind::Hotp {
        uri.push_str(&format!("&counter={}", record.counter));
    }

    uri
}
