use serde::{Deserialize, Serialize};

/// Moves files whose name contains `keyword` into `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSortRule {
    pub keyword: String,
    pub category: String,
}

impl AutoSortRule {
    pub fn new(keyword: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            category: category.into(),
        }
    }

    /// Case-insensitive substring match. A blank keyword matches nothing.
    pub fn matches(&self, file_name: &str) -> bool {
        let keyword = self.keyword.trim().to_lowercase();
        !keyword.is_empty() && file_name.to_lowercase().contains(&keyword)
    }
}

/// First rule, in order, whose keyword occurs in `file_name`.
pub fn match_rule<'a>(rules: &'a [AutoSortRule], file_name: &str) -> Option<&'a AutoSortRule> {
    rules.iter().find(|rule| rule.matches(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = vec![
            AutoSortRule::new("Game", "Games"),
            AutoSortRule::new("screenshot", "Shots"),
        ];
        let rule = match_rule(&rules, "game_Screenshot_01.png").unwrap();
        assert_eq!(rule.category, "Games");
        assert_eq!(match_rule(&rules, "SCREENSHOT.png").unwrap().category, "Shots");
        assert!(match_rule(&rules, "holiday.jpg").is_none());
    }

    #[test]
    fn test_blank_keyword_never_matches() {
        let rules = vec![AutoSortRule::new("  ", "Anything")];
        assert!(match_rule(&rules, "a.jpg").is_none());
    }
}
