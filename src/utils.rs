use byte_unit::{Byte, UnitType};

/// Common error codes shared by every webapi service
pub const ERROR_CODES: [(i32, &str); 8] = [
    (100, "Unknown error"),
    (101, "No parameter of API, method or version"),
    (102, "The requested API does not exist"),
    (103, "The requested method does not exist"),
    (104, "The requested version does not support the functionality"),
    (105, "The logged in session does not have permission"),
    (106, "Session timeout"),
    (107, "Session interrupted by duplicate login"),
];

/// Looks up the message of a common error code
#[must_use]
pub fn error_message(code: i32) -> Option<&'static str> {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| *message)
}

/// Message for a failed envelope, falling back to a generic one for codes outside the table
#[must_use]
pub fn describe_error(code: i32) -> String {
    error_message(code).map_or_else(|| format!("Unknown error with code {code}"), String::from)
}

/// Escapes backslashes and commas in a parameter value.
///
/// Some endpoints accept comma separated lists, so a literal comma inside a
/// single value has to be escaped before joining.
#[must_use]
pub fn escape_param(param: &str) -> String {
    param.replace('\\', "\\\\").replace(',', "\\,")
}

#[must_use]
pub fn human_size(bytes: usize) -> String {
    let size = Byte::from(bytes as u64);
    format!("{:#.2}", size.get_appropriate_unit(UnitType::Decimal))
}
