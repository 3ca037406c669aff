//! SDK shapes to inventory types
//!
//! SDK accessors return `&str` for required members and `Option<&str>` for
//! optional ones; [`text`] and [`number`] accept either.

pub(crate) fn text<'a>(value: impl Into<Option<&'a str>>) -> String {
    value.into().unwrap_or_default().to_string()
}

pub(crate) fn number(value: impl Into<Option<i32>>) -> i32 {
    value.into().unwrap_or_default()
}

pub(crate) fn flag(value: impl Into<Option<bool>>) -> bool {
    value.into().unwrap_or_default()
}

/// Split an ASG VPC zone identifier (`subnet-a,subnet-b`)
pub(crate) fn split_subnets(identifier: Option<&str>) -> Vec<String> {
    identifier
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
