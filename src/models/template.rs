//! Starter templates for new apps.

use serde::Serialize;

/// Category filter value that matches every template.
pub const ALL_CATEGORIES: &str = "All";

/// A canned prompt the user can start an app from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub category: &'static str,
    pub prompt: &'static str,
}

impl Template {
    /// Prompt for a create request started from this template.
    ///
    /// Extra user text refines the template prompt.
    pub fn compose_prompt(&self, extra: &str) -> String {
        match extra.trim() {
            "" => self.prompt.to_string(),
            extra => format!("{}\n\nAdditional requirements: {}", self.prompt, extra),
        }
    }
}

static TEMPLATES: &[Template] = &[
    Template {
        id: "todo",
        name: "Todo List",
        icon: "✅",
        category: "Productivity",
        prompt: "A todo list with add, complete and delete, filters for active and done items, saved in localStorage",
    },
    Template {
        id: "pomodoro",
        name: "Pomodoro Timer",
        icon: "🍅",
        category: "Productivity",
        prompt: "A pomodoro timer with 25/5 minute cycles, start/pause/reset, a session counter and a sound at the end of each cycle",
    },
    Template {
        id: "notes",
        name: "Notes",
        icon: "📝",
        category: "Productivity",
        prompt: "A notes app with a sidebar of notes, search, markdown preview and localStorage persistence",
    },
    Template {
        id: "calculator",
        name: "Calculator",
        icon: "🧮",
        category: "Utilities",
        prompt: "A calculator with keyboard support, operator precedence, a history of past results and a clear button",
    },
    Template {
        id: "unit-converter",
        name: "Unit Converter",
        icon: "📏",
        category: "Utilities",
        prompt: "A unit converter for length, weight, temperature and volume with instant conversion as the user types",
    },
    Template {
        id: "snake",
        name: "Snake",
        icon: "🐍",
        category: "Games",
        prompt: "A snake game on a canvas with arrow key and swipe controls, increasing speed and a saved high score",
    },
    Template {
        id: "memory",
        name: "Memory Cards",
        icon: "🃏",
        category: "Games",
        prompt: "A memory card matching game with a 4x4 grid, flip animations, a move counter and a timer",
    },
    Template {
        id: "budget",
        name: "Budget Tracker",
        icon: "💰",
        category: "Finance",
        prompt: "A budget tracker for income and expenses with categories, a monthly summary and a chart of spending by category",
    },
];

/// Every built-in template.
pub fn templates() -> &'static [Template] {
    TEMPLATES
}

pub fn find_template(id: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.id == id)
}

/// Template categories, sorted, with `All` first.
pub fn template_categories(templates: &[Template]) -> Vec<String> {
    let mut names: Vec<String> = templates.iter().map(|t| t.category.to_string()).collect();
    names.sort();
    names.dedup();
    names.insert(0, ALL_CATEGORIES.to_string());
    names
}

/// Templates in one category, or all of them for `All`.
pub fn filter_by_category(templates: &[Template], category: &str) -> Vec<Template> {
    templates
        .iter()
        .filter(|t| category == ALL_CATEGORIES || t.category == category)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_sorted_with_all_first() {
        assert_eq!(
            template_categories(templates()),
            vec!["All", "Finance", "Games", "Productivity", "Utilities"]
        );
    }

    #[test]
    fn test_filter_by_category() {
        let games = filter_by_category(templates(), "Games");
        assert_eq!(games.len(), 2);
        assert!(games.iter().all(|t| t.category == "Games"));
        assert_eq!(
            filter_by_category(templates(), ALL_CATEGORIES).len(),
            templates().len()
        );
        assert!(filter_by_category(templates(), "Music").is_empty());
    }

    #[test]
    fn test_template_ids_are_unique() {
        let mut ids: Vec<&str> = templates().iter().map(|t| t.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), templates().len());
    }

    #[test]
    fn test_compose_prompt() {
        let todo = find_template("todo").unwrap();
        assert_eq!(todo.compose_prompt("  "), todo.prompt);
        assert!(todo
            .compose_prompt("dark theme")
            .ends_with("Additional requirements: dark theme"));
        assert!(find_template("missing").is_none());
    }
}
