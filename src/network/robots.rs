//! robots.txt rules

use std::time::Duration;

/// Rules of the robots.txt group that applies to one user agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsRules {
    /// `(allow, path prefix)` in file order
    rules: Vec<(bool, String)>,
    crawl_delay: Option<Duration>,
}

impl RobotsRules {
    /// Rules that allow everything
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt for `agent`, falling back to the `*` group
    pub fn parse(robots_txt: &str, agent: &str) -> Self {
        let agent = agent.to_lowercase();
        let mut specific: Option<RobotsRules> = None;
        let mut wildcard: Option<RobotsRules> = None;

        // agents of the group being read, and whether its rules have started
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut current = RobotsRules::default();

        let mut flush = |group: &[String], rules: RobotsRules| {
            if group.is_empty() {
                return;
            }
            if group.iter().any(|a| a != "*" && agent.contains(a.as_str())) {
                specific.get_or_insert_with(RobotsRules::default).absorb(rules);
            } else if group.iter().any(|a| a == "*") {
                wildcard.get_or_insert_with(RobotsRules::default).absorb(rules);
            }
        };

        for line in robots_txt.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_lowercase().as_str() {
                "user-agent" => {
                    if in_rules {
                        flush(&group, std::mem::take(&mut current));
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // an empty Disallow allows everything
                    if !value.is_empty() {
                        current.rules.push((directive.trim().eq_ignore_ascii_case("allow"), value.to_string()));
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    if let Ok(secs) = value.parse::<f64>() {
                        if secs.is_finite() && secs >= 0.0 {
                            current.crawl_delay = Some(Duration::from_secs_f64(secs));
                        }
                    }
                }
                _ => {}
            }
        }
        flush(&group, current);

        specific.or(wildcard).unwrap_or_default()
    }

    fn absorb(&mut self, other: RobotsRules) {
        self.rules.extend(other.rules);
        if other.crawl_delay.is_some() {
            self.crawl_delay = other.crawl_delay;
        }
    }

    /// Whether `path` may be fetched; the longest matching prefix wins,
    /// Allow wins a tie
    pub fn is_allowed(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let mut best: Option<(usize, bool)> = None;

        for (allow, pattern) in &self.rules {
            if let Some(len) = match_len(pattern, path) {
                best = match best {
                    Some((best_len, best_allow))
                        if best_len > len || (best_len == len && best_allow) =>
                    {
                        Some((best_len, best_allow))
                    }
                    _ => Some((len, *allow)),
                };
            }
        }

        best.map_or(true, |(_, allow)| allow)
    }

    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }
}

/// Length of `pattern` if it matches the start of `path`.
/// Supports `*` wildcards and a trailing `$` anchor.
fn match_len(pattern: &str, path: &str) -> Option<usize> {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return None;
    }
    let mut pos = first.len();
    for part in parts {
        match path[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return None,
        }
    }
    if anchored && pos != path.len() && !pattern.ends_with('*') {
        return None;
    }
    Some(pattern.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "
# example
User-agent: *
Disallow: /private/
Allow: /private/press/
Disallow: /*.pdf$
Crawl-delay: 2

User-agent: diligence-rs
Disallow: /internal
";

    #[test]
    fn test_wildcard_group() {
        let rules = RobotsRules::parse(ROBOTS, "SomeBot/1.0");
        assert!(rules.is_allowed("/"));
        assert!(rules.is_allowed("/about"));
        assert!(!rules.is_allowed("/private/report"));
        assert!(rules.is_allowed("/private/press/release"));
        assert!(!rules.is_allowed("/files/annual.pdf"));
        assert!(rules.is_allowed("/files/annual.pdf.html"));
        assert_eq!(rules.crawl_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_specific_group_wins() {
        let rules = RobotsRules::parse(ROBOTS, "diligence-rs/0.1.0");
        assert!(!rules.is_allowed("/internal/x"));
        assert!(rules.is_allowed("/private/report"));
        assert_eq!(rules.crawl_delay(), None);
    }

    #[test]
    fn test_empty_and_disallow_all() {
        assert!(RobotsRules::parse("", "bot").is_allowed("/anything"));
        assert!(RobotsRules::parse("User-agent: *\nDisallow:", "bot").is_allowed("/x"));
        assert!(!RobotsRules::parse("User-agent: *\nDisallow: /", "bot").is_allowed("/x"));
    }
}
