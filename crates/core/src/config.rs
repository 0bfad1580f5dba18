//! Shared plumbing for layered configuration: read an optional TOML file,
//! then apply environment overrides.  Nothing here fails; problems are
//! pushed onto a `warnings` list and the caller's defaults stay in place.

use serde::de::DeserializeOwned;
use std::str::FromStr;

/// Read and parse a TOML file.  A missing file is only worth a warning when
/// the path was asked for explicitly.
pub fn load<T>(path: &str, explicit: bool, warnings: &mut Vec<String>) -> T
where
    T: DeserializeOwned + Default,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            return T::default();
        }
        Err(e) => {
            warnings.push(format!("failed to read config {path}: {e}, using defaults"));
            return T::default();
        }
    };
    parse(&contents, path, warnings)
}

pub fn parse<T>(contents: &str, path: &str, warnings: &mut Vec<String>) -> T
where
    T: DeserializeOwned + Default,
{
    match toml::from_str(contents) {
        Ok(cfg) => cfg,
        Err(e) => {
            warnings.push(format!("failed to parse config {path}: {e}, using defaults"));
            T::default()
        }
    }
}

/// Replace `slot` with the parsed value of `key`, if set.
pub fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T, warnings: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => warnings.push(format!("{key}={raw:?} is not a valid number, ignoring")),
    }
}

/// Accepts `1`/`0`/`true`/`false` (any case).
pub fn override_bool<F>(lookup: &F, key: &str, slot: &mut bool, warnings: &mut Vec<String>)
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else { return };
    let v = raw.trim();
    if v == "1" || v.eq_ignore_ascii_case("true") {
        *slot = true;
    } else if v == "0" || v.eq_ignore_ascii_case("false") {
        *slot = false;
    } else {
        warnings.push(format!("{key}={raw:?} is not a boolean, ignoring"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Probe {
        width: i64,
        name: String,
    }

    fn lookup(key: &str) -> Option<String> {
        match key {
            "WIDTH" => Some(" 12 ".into()),
            "BAD" => Some("twelve".into()),
            "ON" => Some("TRUE".into()),
            "OFF" => Some("0".into()),
            _ => None,
        }
    }

    #[test]
    fn parse_and_fall_back() {
        let mut warnings = Vec::new();
        let p: Probe = parse("width = 4\nname = \"a\"", "p.toml", &mut warnings);
        assert_eq!(p.width, 4);
        assert!(warnings.is_empty());

        let p: Probe = parse("width = ", "p.toml", &mut warnings);
        assert_eq!(p, Probe::default());
        assert!(warnings[0].starts_with("failed to parse config p.toml"));
    }

    #[test]
    fn missing_file_silent_unless_explicit() {
        let mut warnings = Vec::new();
        let _: Probe = load("/nonexistent/x.toml", false, &mut warnings);
        assert!(warnings.is_empty());
        let _: Probe = load("/nonexistent/x.toml", true, &mut warnings);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn overrides() {
        let mut warnings = Vec::new();
        let mut width = 1_i64;
        override_parsed(&lookup, "WIDTH", &mut width, &mut warnings);
        assert_eq!(width, 12);
        override_parsed(&lookup, "BAD", &mut width, &mut warnings);
        assert_eq!(width, 12);
        override_parsed(&lookup, "UNSET", &mut width, &mut warnings);
        assert_eq!(width, 12);

        let mut flag = false;
        override_bool(&lookup, "ON", &mut flag, &mut warnings);
        assert!(flag);
        override_bool(&lookup, "OFF", &mut flag, &mut warnings);
        assert!(!flag);
        override_bool(&lookup, "WIDTH", &mut flag, &mut warnings);

        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("BAD=\"twelve\""));
        assert!(warnings[1].contains("is not a boolean"));
    }
}
