//! Minimal `{{ name }}` placeholder renderer for template resources.
//!
//! The variable space is a flat name-to-string map resolved before the run;
//! anything fancier (loops, conditionals, filters) is out of scope.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("unclosed `{{{{` at byte {offset}")]
    Unclosed { offset: usize },

    #[error("empty placeholder at byte {offset}")]
    EmptyPlaceholder { offset: usize },

    #[error("undefined template variable `{name}`")]
    Undefined { name: String },
}

/// Substitute `{{ name }}` placeholders from `vars`. Text outside
/// placeholders passes through untouched, single braces included.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let placeholder_at = offset + open;
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            return Err(RenderError::Unclosed {
                offset: placeholder_at,
            });
        };

        let name = after_open[..close].trim();
        if name.is_empty() {
            return Err(RenderError::EmptyPlaceholder {
                offset: placeholder_at,
            });
        }
        let Some(value) = vars.get(name) else {
            return Err(RenderError::Undefined {
                name: name.to_string(),
            });
        };
        out.push_str(value);

        let consumed = open + 2 + close + 2;
        rest = &rest[consumed..];
        offset += consumed;
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders() {
        let out = render(
            "exec java -jar {{ jar }} server {{ config }}\n",
            &vars(&[("jar", "/usr/share/java/app.jar"), ("config", "/etc/app/service.yml")]),
        )
        .expect("render");
        assert_eq!(
            out,
            "exec java -jar /usr/share/java/app.jar server /etc/app/service.yml\n"
        );
    }

    #[test]
    fn placeholder_whitespace_is_insignificant() {
        let out = render("{{port}} {{  port  }}", &vars(&[("port", "8080")])).expect("render");
        assert_eq!(out, "8080 8080");
    }

    #[test]
    fn passes_through_text_without_placeholders() {
        let out = render("plain { text } with } braces {", &vars(&[])).expect("render");
        assert_eq!(out, "plain { text } with } braces {");
    }

    #[test]
    fn same_variable_renders_every_occurrence() {
        let out = render("{{ a }}-{{ a }}", &vars(&[("a", "x")])).expect("render");
        assert_eq!(out, "x-x");
    }

    #[test]
    fn rejects_unclosed_placeholder() {
        let err = render("port: {{ port", &vars(&[("port", "8080")])).unwrap_err();
        assert_eq!(err, RenderError::Unclosed { offset: 6 });
    }

    #[test]
    fn rejects_undefined_variable() {
        let err = render("{{ missing }}", &vars(&[])).unwrap_err();
        assert_eq!(
            err,
            RenderError::Undefined {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn rejects_empty_placeholder() {
        let err = render("x {{   }} y", &vars(&[])).unwrap_err();
        assert_eq!(err, RenderError::EmptyPlaceholder { offset: 2 });
    }
}
