//! Command template rendering.
//!
//! Templates use `{key}` placeholders resolved against the frozen config
//! snapshot, with `{key|fallback}` supplying a default for optional options
//! (for example `{wsgi_path|wsgi}`). Rendering is a pure function: a missing
//! key with no fallback is a hard [`Error::Render`], never a silently
//! empty substitution.

use crate::config::Config;
use crate::{Error, Result};

/// Render a command template against a configuration snapshot.
///
/// `{{` and `}}` escape literal braces.
///
/// # Errors
///
/// Returns [`Error::Render`] naming the first placeholder whose key is
/// absent from the config and has no `|fallback`.
pub fn render(template: &str, config: &Config) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut placeholder = String::new();
                let mut closed = false;
                for p in chars.by_ref() {
                    if p == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(p);
                }
                if !closed {
                    return Err(Error::Validation(format!(
                        "Unclosed placeholder in template: {}",
                        template
                    )));
                }
                out.push_str(&substitute(&placeholder, config)?);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Resolve one `key` or `key|fallback` placeholder.
fn substitute(placeholder: &str, config: &Config) -> Result<String> {
    let (key, fallback) = match placeholder.split_once('|') {
        Some((key, fallback)) => (key, Some(fallback)),
        None => (placeholder, None),
    };

    match config.fetch(key) {
        Some(value) => Ok(value.render()),
        None => match fallback {
            Some(fallback) => Ok(fallback.to_string()),
            None => Err(Error::Render {
                key: key.to_string(),
            }),
        },
    }
}
