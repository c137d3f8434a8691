//! APM text rendering of a model
//!
//! The server reads `Parameters`, `Variables`, `Intermediates` and
//! `Equations` blocks with `!` comments and `$name` time derivatives.

use std::fmt::Write;

use crate::model::definition::{Model, VariableRole};

const INDENT: &str = "  ";

/// Model source text as transmitted to the remote solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDocument {
    text: String,
}

impl ModelDocument {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    /// Reassemble a document from lines split on `\n`
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let text = lines.into_iter().collect::<Vec<_>>().join("\n");
        Self { text }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Lines in transmission order, blank lines included
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }
}

impl Model {
    pub fn to_document(&self) -> ModelDocument {
        let mut out = String::new();
        for comment in self.comments() {
            push_line(&mut out, 0, &format!("! {}", comment));
        }
        push_line(&mut out, 0, "Model");

        if !self.parameters().is_empty() {
            push_line(&mut out, 1, "Parameters");
            for p in self.parameters() {
                let line = format!("{} = {}", p.name, p.value.nominal());
                push_line(&mut out, 2, &with_note(line, &p.note));
            }
            push_line(&mut out, 1, "End Parameters");
        }

        for (role, label) in [
            (VariableRole::Control, "manipulated variables"),
            (VariableRole::State, "state variables"),
        ] {
            let vars: Vec<_> = self.variables().iter().filter(|v| v.role == role).collect();
            if vars.is_empty() {
                continue;
            }
            push_line(&mut out, 1, &format!("! {}", label));
            push_line(&mut out, 1, "Variables");
            for v in vars {
                let mut line = format!("{} = {}", v.name, v.initial);
                if let Some(lo) = v.lower {
                    let _ = write!(line, ", >={}", lo);
                }
                if let Some(hi) = v.upper {
                    let _ = write!(line, ", <={}", hi);
                }
                push_line(&mut out, 2, &with_note(line, &v.note));
            }
            push_line(&mut out, 1, "End Variables");
        }

        if !self.intermediates().is_empty() {
            push_line(&mut out, 1, "Intermediates");
            for i in self.intermediates() {
                push_line(&mut out, 2, &with_note(format!("{} = {}", i.name, i.expr), &i.note));
            }
            push_line(&mut out, 1, "End Intermediates");
        }

        if !self.equations().is_empty() || !self.objectives().is_empty() {
            push_line(&mut out, 1, "Equations");
            for eq in self.equations() {
                let state = &self.variables()[eq.state].name;
                if !eq.note.is_empty() {
                    push_line(&mut out, 2, &format!("! {}", eq.note));
                }
                push_line(&mut out, 2, &format!("${} = {}", state, eq.rhs));
            }
            for term in self.objectives() {
                let squared = term.residual.clone().powi(2);
                let line = match term.weight.as_constant() {
                    Some(w) if w == 1.0 => format!("minimize {}", squared),
                    _ => format!("minimize {}", term.weight.clone() * squared),
                };
                push_line(&mut out, 2, &line);
            }
            push_line(&mut out, 1, "End Equations");
        }
        out.push_str("End Model");

        ModelDocument::new(out)
    }
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
    out.push_str(line);
    out.push('\n');
}

fn with_note(line: String, note: &str) -> String {
    if note.is_empty() {
        line
    } else {
        format!("{} ! {}", line, note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::definition::{ModelBuilder, VarSpec};

    fn small_model() -> Model {
        let mut b = ModelBuilder::new("small");
        b.comment("small test model");
        let k = b.param("k", 2.5, "gain");
        let u = b.control("u", VarSpec::new(0.0).bounds(-10.0, 10.0).note("input"));
        let x = b.state("x", VarSpec::new(1.0));
        b.equation(&x, k.expr() * u.expr() - x.expr(), "first order lag");
        b.minimize(1.0, x.expr());
        b.minimize(0.001, u.expr());
        b.build().unwrap()
    }

    #[test]
    fn test_document_blocks() {
        let doc = small_model().to_document();
        let expected = "! small test model\n\
                        Model\n  \
                        Parameters\n    \
                        k = 2.5 ! gain\n  \
                        End Parameters\n  \
                        ! manipulated variables\n  \
                        Variables\n    \
                        u = 0, >=-10, <=10 ! input\n  \
                        End Variables\n  \
                        ! state variables\n  \
                        Variables\n    \
                        x = 1\n  \
                        End Variables\n  \
                        Equations\n    \
                        ! first order lag\n    \
                        $x = k*u - x\n    \
                        minimize x^2\n    \
                        minimize 0.001*u^2\n  \
                        End Equations\n\
                        End Model";
        assert_eq!(doc.text(), expected);
    }

    #[test]
    fn test_lines_reassemble_exactly() {
        let text = "\n! header\nModel\n\n  Parameters\nEnd Model\n";
        let doc = ModelDocument::new(text.to_string());
        let lines: Vec<&str> = doc.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "");
        assert_eq!(lines[3], "");
        assert_eq!(ModelDocument::from_lines(lines).text(), text);
    }
}
