//! Percent-token folder names such as `%Cn/%Vn`.
//!
//! | token | value |
//! |-------|-------|
//! | `%Dn` | node name |
//! | `%Cn` | cluster name |
//! | `%Ci` | cluster id |
//! | `%Vn` | version number |
//! | `%Bf` | build flavor |
//! | `%Bt` | build type |
//! | `%Bs` | build snapshot flag |
//! | `%Lv` | engine (Lucene) version |
//!
//! Unknown tokens are left untouched.
use crate::filter::Attributes;

/// Token to attribute name, looked up through [`Attributes`].
pub const FOLDER_TOKENS: [(&str, &str); 8] = [
    ("Dn", "name"),
    ("Cn", "cluster_name"),
    ("Ci", "cluster_id"),
    ("Vn", "version_number"),
    ("Bf", "build_flavor"),
    ("Bt", "build_type"),
    ("Bs", "build_snapshot"),
    ("Lv", "lucene_version"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderTemplate {
    format: String,
}

impl FolderTemplate {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.format
    }

    /// Substitutes every known token with the matching attribute of
    /// `source`. Each substituted value goes through [`path_component`].
    pub fn render(&self, source: &impl Attributes) -> String {
        let mut rendered = String::with_capacity(self.format.len());
        let mut rest = self.format.as_str();

        while let Some(pos) = rest.find('%') {
            rendered.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let token = FOLDER_TOKENS
                .iter()
                .find(|(token, _)| after.starts_with(token));

            match token {
                Some((token, attribute)) => {
                    let value = source.attribute(attribute).unwrap_or_default();
                    rendered.push_str(&path_component(&value));
                    rest = &after[token.len()..];
                }
                None => {
                    rendered.push('%');
                    rest = after;
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

/// Turns a server-supplied value into one relative path component.
///
/// Separators and drive colons become `_`, and a value made only of dots
/// (`.`, `..`) is replaced by as many underscores.
pub fn path_component(value: &str) -> String {
    if !value.is_empty() && value.chars().all(|c| c == '.') {
        return "_".repeat(value.len());
    }
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
