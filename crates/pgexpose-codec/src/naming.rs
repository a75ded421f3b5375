//! Object key conversion applied at encode time

use std::borrow::Cow;

use pgexpose_common::NameConversion;

/// Rewrites declared field and column names into JSON keys
pub trait NameConverter: Send + Sync {
    fn convert<'a>(&self, name: &'a str) -> Cow<'a, str>;
}

/// Keys are written as declared
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl NameConverter for Identity {
    fn convert<'a>(&self, name: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(name)
    }
}

/// `nested_val` → `nestedVal`, `Label` → `label`
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCase;

impl NameConverter for CamelCase {
    fn convert<'a>(&self, name: &'a str) -> Cow<'a, str> {
        let starts_lower = name.chars().next().map_or(true, |c| !c.is_uppercase());
        if !name.contains('_') && starts_lower {
            return Cow::Borrowed(name);
        }

        let mut out = String::with_capacity(name.len());
        for (i, part) in name.split('_').filter(|p| !p.is_empty()).enumerate() {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                if i == 0 {
                    out.extend(first.to_lowercase());
                } else {
                    out.extend(first.to_uppercase());
                }
                out.push_str(chars.as_str());
            }
        }

        if out.is_empty() {
            // all underscores
            Cow::Borrowed(name)
        } else {
            Cow::Owned(out)
        }
    }
}

/// Converter for a configured [`NameConversion`]
pub fn converter_for(conversion: NameConversion) -> Box<dyn NameConverter> {
    match conversion {
        NameConversion::CamelCase => Box::new(CamelCase),
        NameConversion::Identity => Box::new(Identity),
    }
}
