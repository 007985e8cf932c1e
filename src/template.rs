//! `{{ }}` rendering of command text, shell and environment values.
//!
//! The context is the trigger's [`EventData::to_map`]: `emitter` plus every
//! extra. Rendering never fails hard; on error the raw text is returned and a
//! warning is logged.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use minijinja::value::{Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};
use std::sync::LazyLock;

use crate::core::event_data::EventData;

static ENV: LazyLock<Environment<'static>> = LazyLock::new(build_environment);

/// Render `text` against `event`, falling back to `text` on failure.
pub fn render(text: &str, event: &EventData) -> String {
    if !text.contains("{{") && !text.contains("{%") {
        return text.to_string();
    }
    match try_render(text, event) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!(template = text, error = %e, "failed to apply template");
            text.to_string()
        }
    }
}

/// Render `text` against `event`.
pub fn try_render(text: &str, event: &EventData) -> Result<String, Error> {
    ENV.render_str(text, event.to_map())
}

fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_function("env", |key: String| std::env::var(key).unwrap_or_default());
    env.add_function("b64enc", |s: String| STANDARD.encode(s));
    env.add_function("b64dec", b64dec);
    env.add_function("toUpper", |s: String| s.to_uppercase());
    env.add_function("toLower", |s: String| s.to_lowercase());
    env.add_function("trim", |s: String| s.trim().to_string());
    env.add_function("join", join);
    env.add_function("replace", |s: String, old: String, new: String| s.replace(&old, &new));
    env.add_function("hasPrefix", |s: String, prefix: String| s.starts_with(&prefix));
    env.add_function("hasSuffix", |s: String, suffix: String| s.ends_with(&suffix));
    env.add_function("contains", |s: String, sub: String| s.contains(&sub));
    env.add_function("toJSON", to_json);
    env.add_function("fromJSON", from_json);
    env.add_function("itoa", |i: i64| i.to_string());
    env.add_function("atoi", atoi);
    env.add_function("toInt", to_int);
    env.add_function("atob", atob);
    env.add_function("read", read);
    env.add_function("sum", sum);
    env
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn b64dec(s: String) -> Result<String, Error> {
    let bytes = STANDARD
        .decode(s.as_bytes())
        .map_err(|e| invalid(format!("invalid base64: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn join(items: Value, sep: String) -> Result<String, Error> {
    let parts: Vec<String> = items.try_iter()?.map(|v| v.to_string()).collect();
    Ok(parts.join(&sep))
}

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|e| invalid(format!("cannot encode json: {}", e)))
}

fn from_json(s: String) -> Result<Value, Error> {
    let parsed: serde_json::Value =
        serde_json::from_str(&s).map_err(|e| invalid(format!("cannot decode json: {}", e)))?;
    Ok(Value::from_serialize(&parsed))
}

fn atoi(s: String) -> Result<i64, Error> {
    s.trim()
        .parse()
        .map_err(|_| invalid(format!("cannot convert {:?} to int", s)))
}

fn to_int(value: Value) -> Result<i64, Error> {
    match value.kind() {
        ValueKind::Number => match value.as_i64() {
            Some(i) => Ok(i),
            None => f64::try_from(value).map(|f| f as i64),
        },
        ValueKind::String => {
            let s = value.as_str().unwrap_or_default().trim();
            s.parse::<i64>()
                .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                .map_err(|_| invalid(format!("cannot convert string to int: {}", s)))
        }
        ValueKind::Bool => Ok(value.is_true() as i64),
        other => Err(invalid(format!("unsupported type: {}", other))),
    }
}

fn atob(s: String) -> Result<bool, Error> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(format!("invalid boolean value: {}", s))),
    }
}

fn read(path: String) -> Result<String, Error> {
    std::fs::read_to_string(&path)
        .map_err(|e| invalid(format!("failed to read file {}: {}", path, e)))
}

fn sum(a: Value, b: Value) -> Result<Value, Error> {
    if let Some(a) = a.as_str() {
        return Ok(Value::from(format!("{}{}", a, b)));
    }
    if a.kind() != ValueKind::Number || b.kind() != ValueKind::Number {
        return Err(invalid(format!(
            "unsupported types for sum: {} and {}",
            a.kind(),
            b.kind()
        )));
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(total) = x.checked_add(y) {
            return Ok(Value::from(total));
        }
    }
    let x = f64::try_from(a)?;
    let y = f64::try_from(b)?;
    Ok(Value::from(x + y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn event() -> EventData {
        EventData::new("log-file")
            .with("line", "ERROR 42 disk full")
            .with("groups", serde_json::json!({"code": "42"}))
            .with("count", 3)
    }

    #[test]
    fn test_plain_text_is_untouched() {
        assert_eq!(render("echo hello", &event()), "echo hello");
    }

    #[test]
    fn test_renders_event_fields() {
        assert_eq!(
            render("echo {{ emitter }} {{ groups.code }}", &event()),
            "echo log-file 42"
        );
    }

    #[test]
    fn test_string_helpers() {
        let e = event();
        assert_eq!(render("{{ toUpper('abc') }}", &e), "ABC");
        assert_eq!(render("{{ trim('  x ') }}", &e), "x");
        assert_eq!(render("{{ replace(line, 'ERROR', 'WARN') }}", &e), "WARN 42 disk full");
        assert_eq!(render("{{ hasPrefix(line, 'ERROR') }}", &e), "true");
        assert_eq!(render("{{ join(['a', 'b'], ',') }}", &e), "a,b");
    }

    #[test]
    fn test_encoding_helpers() {
        let e = event();
        assert_eq!(render("{{ b64enc('hi') }}", &e), "aGk=");
        assert_eq!(render("{{ b64dec('aGk=') }}", &e), "hi");
        assert_eq!(render("{{ toJSON(groups) }}", &e), r#"{"code":"42"}"#);
        assert_eq!(render(r#"{{ fromJSON('{"a": 1}').a }}"#, &e), "1");
    }

    #[test]
    fn test_number_helpers() {
        let e = event();
        assert_eq!(render("{{ sum(count, 2) }}", &e), "5");
        assert_eq!(render("{{ sum('a', 'b') }}", &e), "ab");
        assert_eq!(render("{{ toInt(groups.code) + 1 }}", &e), "43");
        assert_eq!(render("{{ atoi('7') }}", &e), "7");
        assert_eq!(render("{{ itoa(7) }}", &e), "7");
        assert_eq!(render("{{ atob('TRUE') }}", &e), "true");
    }

    #[test]
    fn test_read_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file").unwrap();
        let path = file.path().display().to_string();

        assert_eq!(render(&format!("{{{{ read('{}') }}}}", path), &event()), "from file");
        assert_eq!(render("{{ env('CRONTAB_SURELY_UNSET_VAR') }}", &event()), "");
    }

    #[test]
    fn test_failure_returns_raw_text() {
        let broken = "echo {{ atoi('nope') }}";
        assert_eq!(render(broken, &event()), broken);
        assert!(try_render("{{ unclosed", &event()).is_err());
        assert_eq!(render("{{ unclosed", &event()), "{{ unclosed");
    }
}
