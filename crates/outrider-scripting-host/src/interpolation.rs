//! Variable substitution in script text
//!
//! `%name` and `%{name}` look in the script's locals first, then the
//! globals. `$name` and `${name}` only look in the globals. A doubled sigil
//! is a literal. Names nobody has defined are left as written.

use std::collections::BTreeMap;

use outrider_client::GlobalVariables;

use crate::error::RuntimeError;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn interpolate(
    text: &str,
    locals: &BTreeMap<String, String>,
    globals: &GlobalVariables,
) -> Result<String, RuntimeError> {
    if !text.contains(['%', '$']) {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(['%', '$']) {
        out.push_str(&rest[..pos]);
        let sigil = rest[pos..].chars().next().unwrap_or('%');
        let after = &rest[pos + 1..];

        // Doubled sigil
        if after.starts_with(sigil) {
            out.push(sigil);
            rest = &after[1..];
            continue;
        }

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            let Some(close) = braced.find('}') else {
                return Err(RuntimeError::MalformedVariable {
                    text: text.to_string(),
                });
            };
            let name = &braced[..close];
            if name.is_empty() {
                return Err(RuntimeError::MalformedVariable {
                    text: text.to_string(),
                });
            }
            (name, close + 2)
        } else {
            let len = after
                .char_indices()
                .find(|(_, c)| !is_name_char(*c))
                .map(|(i, _)| i)
                .unwrap_or(after.len());
            (&after[..len], len)
        };

        // A lone sigil, e.g. "50% off"
        if name.is_empty() {
            out.push(sigil);
            rest = after;
            continue;
        }

        let value = match sigil {
            '%' => locals.get(name).cloned().or_else(|| globals.get(name)),
            _ => globals.get(name),
        };
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[pos..pos + 1 + consumed]),
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}
