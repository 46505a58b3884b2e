use std::path::Path;

use comfy_table::{Cell, Table};

use crate::classifier::{default_rules, load_rules};
use crate::error::Result;
use crate::settings::{load_settings, shellexpand_path};

pub fn list() -> Result<()> {
    let settings = load_settings();
    let (rules, origin) = match &settings.rules_path {
        Some(path) => {
            let expanded = shellexpand_path(path);
            (load_rules(Path::new(&expanded))?, expanded)
        }
        None => (default_rules(), "built-in".to_string()),
    };

    let mut table = Table::new();
    table.set_header(vec!["#", "Code", "Keywords"]);
    for (i, rule) in rules.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(rule.code),
            Cell::new(rule.keywords.join(", ")),
        ]);
    }
    println!("Rules ({origin})\n{table}");
    println!("Unmatched text falls back to {}", settings.fallback_code);
    Ok(())
}
