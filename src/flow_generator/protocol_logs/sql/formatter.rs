pub const DEFAULT_TEMPLATE: &str = "#s:#q";

/// One piece of a compiled output template.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// `#s`: client ip:port
    Source,
    /// `#i`: client ip
    SourceIp,
    /// `#q`: fingerprint of the statement
    Query,
    /// `#r`: route extracted from the statement's route comment
    Route,
}

/// Everything the renderer needs about one request.
pub struct RenderContext<'a> {
    pub src: &'a str,
    pub src_ip: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct Formatter {
    segments: Vec<Segment>,
}

impl Formatter {
    /// Compiles a template with `#` escapes into segments. `##` is a
    /// literal `#`; an unrecognized specifier stays as literal text.
    pub fn compile(template: &str) -> Self {
        let template = template.trim();
        let template = if template.is_empty() {
            DEFAULT_TEMPLATE
        } else {
            template
        };

        let mut segments = vec![];
        let mut literal = String::new();
        let mut is_special = false;
        for ch in template.chars() {
            if ch == '#' {
                if is_special {
                    literal.push(ch);
                    is_special = false;
                } else {
                    is_special = true;
                }
                continue;
            }
            if !is_special {
                literal.push(ch);
                continue;
            }
            is_special = false;
            let segment = match ch.to_ascii_lowercase() {
                's' => Segment::Source,
                'i' => Segment::SourceIp,
                'q' => Segment::Query,
                'r' => Segment::Route,
                _ => {
                    literal.push('#');
                    literal.push(ch);
                    continue;
                }
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    /// Renders one request. `fingerprint` supplies the (possibly raw)
    /// canonical text of a statement body; the route specifier always works
    /// on the raw body because hostnames are stripped from fingerprints.
    pub fn render(
        &self,
        ctx: &RenderContext,
        fingerprint: &mut dyn FnMut(&[u8]) -> String,
    ) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Source => out.push_str(ctx.src),
                Segment::SourceIp => out.push_str(ctx.src_ip),
                Segment::Query => out.push_str(&fingerprint(ctx.body)),
                Segment::Route => match extract_route(&String::from_utf8_lossy(ctx.body)) {
                    Some(route) => out.push_str(route),
                    None => {
                        out.push_str("(unknown) ");
                        out.push_str(&fingerprint(ctx.body));
                    }
                },
            }
        }
        out
    }
}

// `verb /* host:route */ rest` → `route`; a comment without a colon is
// used whole.
fn extract_route(body: &str) -> Option<&str> {
    let parts: Vec<&str> = body.splitn(5, ' ').collect();
    if parts.len() >= 4 && parts[1] == "/*" && parts[3] == "*/" {
        return Some(match parts[2].split_once(':') {
            Some((_, route)) => route,
            None => parts[2],
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(body: &[u8]) -> String {
        super::super::obfuscate::canonicalize(body)
    }

    fn render(template: &str, body: &[u8]) -> String {
        let formatter = Formatter::compile(template);
        let ctx = RenderContext {
            src: "10.0.0.2:50000",
            src_ip: "10.0.0.2",
            body,
        };
        formatter.render(&ctx, &mut clean)
    }

    #[test]
    fn compile_splits_literals_and_specifiers() {
        let formatter = Formatter::compile("#s:#q");
        assert_eq!(
            formatter.segments,
            vec![
                Segment::Source,
                Segment::Literal(":".into()),
                Segment::Query
            ]
        );
    }

    #[test]
    fn escaped_and_unknown_specifiers_stay_literal() {
        let formatter = Formatter::compile("##x #z #Q");
        assert_eq!(
            formatter.segments,
            vec![Segment::Literal("#x #z ".into()), Segment::Query]
        );
    }

    #[test]
    fn empty_template_falls_back_to_default() {
        assert_eq!(
            Formatter::compile("  ").segments,
            Formatter::compile(DEFAULT_TEMPLATE).segments
        );
    }

    #[test]
    fn renders_source_and_query() {
        assert_eq!(
            render("#s:#q", b"SELECT a FROM t WHERE id=7"),
            "10.0.0.2:50000:SELECT a FROM t WHERE id=?"
        );
        assert_eq!(render("#i", b"SELECT 1"), "10.0.0.2");
    }

    #[test]
    fn renders_route() {
        assert_eq!(
            render("#r", b"SELECT /* app01:users.lookup */ id FROM u"),
            "users.lookup"
        );
        assert_eq!(render("#r", b"SELECT /* batch */ id FROM u"), "batch");
        assert_eq!(
            render("#r", b"SELECT id FROM u WHERE a=3"),
            "(unknown) SELECT id FROM u WHERE a=?"
        );
    }
}
