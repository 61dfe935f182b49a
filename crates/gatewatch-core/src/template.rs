//! Command template rendering.
//!
//! A template is split on whitespace into argv. Inside each token,
//! `{name}` is replaced by the matching value. A substituted value stays
//! inside its token even when it contains spaces.

/// Render `template` into an argv vector.
///
/// Placeholders with no matching variable are left as written.
pub fn render(template: &str, vars: &[(&str, &str)]) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| {
            let mut out = token.to_string();
            for (name, value) in vars {
                let placeholder = format!("{{{name}}}");
                if out.contains(&placeholder) {
                    out = out.replace(&placeholder, value);
                }
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_whole_tokens() {
        let argv = render(
            "ip route replace default via {gateway}",
            &[("gateway", "192.0.2.1")],
        );
        assert_eq!(argv, ["ip", "route", "replace", "default", "via", "192.0.2.1"]);
    }

    #[test]
    fn values_with_spaces_stay_one_argument() {
        let argv = render("mail -s {subject} {to}", &[("subject", "gatewatch: all down"), ("to", "noc")]);
        assert_eq!(argv, ["mail", "-s", "gatewatch: all down", "noc"]);
    }

    #[test]
    fn substitutes_inside_tokens() {
        let argv = render("ping -W{timeout} {address}", &[("timeout", "2"), ("address", "10.0.0.1")]);
        assert_eq!(argv, ["ping", "-W2", "10.0.0.1"]);
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        assert_eq!(render("echo {nope}", &[]), ["echo", "{nope}"]);
    }
}
