#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsResult {
    pub disallowed_paths: Vec<String>,
    pub sitemap_url: Option<String>,
}

impl RobotsResult {
    pub fn is_hit(&self) -> bool {
        !self.disallowed_paths.is_empty()
    }
}

pub fn parse_robots(body: &str) -> RobotsResult {
    let disallowed_paths = body
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("Disallow:"))
        .map(|rest| rest.trim().to_string())
        .collect();

    let sitemap_url = body
        .lines()
        .map(str::trim)
        .find(|line| line.to_ascii_lowercase().starts_with("sitemap:"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, url)| url.trim().to_string())
        .filter(|url| !url.is_empty());

    RobotsResult {
        disallowed_paths,
        sitemap_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_disallows_and_sitemap() {
        let body = "User-agent: *\nDisallow: /admin\n  Disallow: /private/ \nAllow: /\nSitemap: https://a.example.com/sitemap.xml\n";
        let result = parse_robots(body);
        assert_eq!(result.disallowed_paths, vec!["/admin", "/private/"]);
        assert_eq!(result.sitemap_url.as_deref(), Some("https://a.example.com/sitemap.xml"));
        assert!(result.is_hit());
    }

    #[test]
    fn no_disallow_lines_is_not_a_hit() {
        let result = parse_robots("User-agent: *\nAllow: /\n");
        assert!(result.disallowed_paths.is_empty());
        assert!(!result.is_hit());
        assert_eq!(result.sitemap_url, None);
    }

    #[test]
    fn sitemap_prefix_is_case_insensitive_and_first_wins() {
        let body = "SITEMAP: https://x/one.xml\r\nsitemap: https://x/two.xml\r\n";
        assert_eq!(parse_robots(body).sitemap_url.as_deref(), Some("https://x/one.xml"));
    }

    #[test]
    fn disallow_prefix_is_case_sensitive() {
        assert!(parse_robots("disallow: /x\n").disallowed_paths.is_empty());
    }

    #[test]
    fn empty_disallow_value_still_counts() {
        assert_eq!(parse_robots("Disallow:\n").disallowed_paths, vec![""]);
    }
}
