//! Parameter input: `<section>` headers with `key = value` lines.
//!
//! The format is deliberately small: section headers in angle brackets,
//! one `key = value` per line, `#` starts a comment. Values are stored as
//! strings and converted on access; `get_or_add_*` accessors record the
//! default so the effective configuration can be written back out.

use std::collections::BTreeMap;

use crate::mesh_error::MeshForestError;
use crate::Real;

/// Parsed parameter input.
#[derive(Clone, Debug, Default)]
pub struct ParameterInput {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ParameterInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from text.
    ///
    /// # Errors
    /// `InputParse` with the offending line number for lines that are neither
    /// a section header, a `key = value` pair, a comment, nor blank.
    pub fn from_str(text: &str) -> Result<Self, MeshForestError> {
        let mut out = Self::new();
        let mut section = String::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                section = name.trim().to_string();
                if section.is_empty() {
                    return Err(MeshForestError::InputParse {
                        line: idx + 1,
                        msg: "empty section name".into(),
                    });
                }
                out.sections.entry(section.clone()).or_default();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(MeshForestError::InputParse {
                    line: idx + 1,
                    msg: format!("expected `key = value`, got `{line}`"),
                });
            };
            let key = key.trim();
            if key.is_empty() || section.is_empty() {
                return Err(MeshForestError::InputParse {
                    line: idx + 1,
                    msg: "key outside a section or empty key".into(),
                });
            }
            out.sections
                .entry(section.clone())
                .or_default()
                .insert(key.to_string(), value.trim().to_string());
        }
        Ok(out)
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        self.sections
            .get(section)
            .map_or(false, |s| s.contains_key(key))
    }

    fn raw(&self, section: &str, key: &str) -> Result<&str, MeshForestError> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
            .ok_or_else(|| MeshForestError::InputValue {
                section: section.to_string(),
                key: key.to_string(),
                msg: "missing".into(),
            })
    }

    fn parse<T: std::str::FromStr>(
        &self,
        section: &str,
        key: &str,
    ) -> Result<T, MeshForestError> {
        let raw = self.raw(section, key)?;
        raw.parse().map_err(|_| MeshForestError::InputValue {
            section: section.to_string(),
            key: key.to_string(),
            msg: format!("cannot parse `{raw}`"),
        })
    }

    pub fn get_integer(&self, section: &str, key: &str) -> Result<i64, MeshForestError> {
        self.parse(section, key)
    }

    pub fn get_real(&self, section: &str, key: &str) -> Result<Real, MeshForestError> {
        self.parse(section, key)
    }

    pub fn get_string(&self, section: &str, key: &str) -> Result<String, MeshForestError> {
        Ok(self.raw(section, key)?.to_string())
    }

    pub fn get_bool(&self, section: &str, key: &str) -> Result<bool, MeshForestError> {
        match self.raw(section, key)? {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(MeshForestError::InputValue {
                section: section.to_string(),
                key: key.to_string(),
                msg: format!("not a boolean: `{other}`"),
            }),
        }
    }

    fn set(&mut self, section: &str, key: &str, value: String) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Read a value, recording `default` if absent.
    pub fn get_or_add_integer(&mut self, section: &str, key: &str, default: i64) -> i64 {
        if !self.has(section, key) {
            self.set(section, key, default.to_string());
        }
        self.get_integer(section, key).unwrap_or(default)
    }

    pub fn get_or_add_real(&mut self, section: &str, key: &str, default: Real) -> Real {
        if !self.has(section, key) {
            self.set(section, key, default.to_string());
        }
        self.get_real(section, key).unwrap_or(default)
    }

    pub fn get_or_add_bool(&mut self, section: &str, key: &str, default: bool) -> bool {
        if !self.has(section, key) {
            self.set(section, key, default.to_string());
        }
        self.get_bool(section, key).unwrap_or(default)
    }

    pub fn get_or_add_string(&mut self, section: &str, key: &str, default: &str) -> String {
        if !self.has(section, key) {
            self.set(section, key, default.to_string());
        }
        self.get_string(section, key)
            .unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<mesh>
refinement = adaptive
numlevel = 3          # comment after value
nx1 = 16
nx2 = 16
nx3 = 1
ix1_bc = periodic
ox1_bc = periodic

<meshblock>
nx1 = 4
nx2 = 4
nx3 = 1

<sparse_advection>
cfl = 0.45
init_size = 0.1
restart_test = false
"#;

    #[test]
    fn parses_sections_and_values() {
        let pin = ParameterInput::from_str(SAMPLE).unwrap();
        assert_eq!(pin.get_string("mesh", "refinement").unwrap(), "adaptive");
        assert_eq!(pin.get_integer("mesh", "numlevel").unwrap(), 3);
        assert_eq!(pin.get_real("sparse_advection", "cfl").unwrap(), 0.45);
        assert!(!pin.get_bool("sparse_advection", "restart_test").unwrap());
    }

    #[test]
    fn missing_and_malformed_values_error() {
        let pin = ParameterInput::from_str(SAMPLE).unwrap();
        assert!(pin.get_integer("mesh", "nope").is_err());
        assert!(pin.get_integer("mesh", "refinement").is_err());
        assert!(ParameterInput::from_str("orphan = 1").is_err());
        assert!(ParameterInput::from_str("<mesh>\njust a line").is_err());
    }

    #[test]
    fn get_or_add_records_defaults() {
        let mut pin = ParameterInput::from_str(SAMPLE).unwrap();
        assert_eq!(pin.get_or_add_real("sparse_advection", "speed", 1.0), 1.0);
        assert!(pin.has("sparse_advection", "speed"));
        // existing values win over the default
        assert_eq!(pin.get_or_add_real("sparse_advection", "cfl", 0.9), 0.45);
    }
}
