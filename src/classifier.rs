use std::path::Path;

use crate::error::{ChoboError, Result};
use crate::models::{CategoryRule, RawMessage, Record};

/// 雑費, used when no keyword matches.
pub const FALLBACK_CODE: i64 = 745;

/// Built-in keyword table. Order matters: within a pass the first listed rule wins.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(350, &["役員借入", "役員貸付", "役員融資"]),
        CategoryRule::new(316, &["源泉", "源泉所得税"]),
        CategoryRule::new(317, &["市県民税", "住民税"]),
        CategoryRule::new(716, &["法定福利", "社会保険", "厚生年金"]),
        CategoryRule::new(717, &["福利厚生", "社員旅行", "忘年会", "新年会"]),
        CategoryRule::new(718, &["広告", "宣伝", "PR", "マーケティング"]),
        CategoryRule::new(722, &["交通費", "タクシー", "電車", "バス", "飛行機", "新幹線", "ガソリン"]),
        CategoryRule::new(727, &["交際費", "接待", "飲食"]),
        CategoryRule::new(737, &["会議", "打ち合わせ", "ミーティング", "面談"]),
        CategoryRule::new(723, &["燃料", "ガソリン", "軽油"]),
        CategoryRule::new(724, &["通信", "電話", "インターネット", "WiFi", "回線", "通話"]),
        CategoryRule::new(725, &["水道", "電気", "ガス", "光熱費"]),
        CategoryRule::new(726, &["税金", "租税", "公課"]),
        CategoryRule::new(728, &["消耗品", "文具"]),
        CategoryRule::new(729, &["事務用品", "オフィス用品"]),
        CategoryRule::new(738, &["リース", "レンタル"]),
        CategoryRule::new(732, &["修繕", "修理", "メンテナンス"]),
        CategoryRule::new(733, &["保険", "損害保険", "生命保険"]),
        CategoryRule::new(734, &["手数料", "振込手数料", "ATM手数料"]),
        CategoryRule::new(739, &["会費", "組合費", "協会費"]),
        CategoryRule::new(741, &["新聞", "図書", "書籍", "雑誌"]),
        CategoryRule::new(743, &["報酬", "手当", "給与"]),
        CategoryRule::new(744, &["家賃", "地代", "賃貸"]),
        CategoryRule::new(745, &["雑費", "その他"]),
    ]
}

/// Load a replacement rule table from a JSON array of `{code, keywords}`.
pub fn load_rules(path: &Path) -> Result<Vec<CategoryRule>> {
    let content = std::fs::read_to_string(path)?;
    let rules: Vec<CategoryRule> = serde_json::from_str(&content)?;
    if rules.is_empty() {
        return Err(ChoboError::Settings(format!(
            "rule file {} contains no rules",
            path.display()
        )));
    }
    Ok(rules)
}

/// Keyword classifier over an immutable, ordered rule table.
pub struct Classifier {
    // (code, lowercased keywords), in declared order
    rules: Vec<(i64, Vec<String>)>,
    fallback: i64,
}

impl Classifier {
    pub fn new(rules: Vec<CategoryRule>, fallback: i64) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| {
                let keywords = r.keywords.iter().map(|k| k.to_lowercase()).collect();
                (r.code, keywords)
            })
            .collect();
        Self { rules, fallback }
    }

    pub fn fallback(&self) -> i64 {
        self.fallback
    }

    /// The code of the first matching rule, or `None` when no keyword hits.
    /// Exact matches are tried across the whole table before any substring match.
    pub fn find(&self, content: &str) -> Option<i64> {
        let normalized = content.to_lowercase();
        let normalized = normalized.trim();

        let exact = self
            .rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| normalized == k.as_str()));
        if let Some((code, _)) = exact {
            return Some(*code);
        }

        self.rules
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| normalized.contains(k.as_str())))
            .map(|(code, _)| *code)
    }

    pub fn classify(&self, content: &str) -> i64 {
        self.find(content).unwrap_or(self.fallback)
    }

    pub fn classify_message(&self, message: RawMessage) -> Record {
        let account_code = self.classify(&message.content);
        Record {
            date: message.date,
            amount: message.amount,
            content: message.content,
            account_code,
        }
    }

    pub fn classify_all(&self, messages: Vec<RawMessage>) -> Vec<Record> {
        messages
            .into_iter()
            .map(|m| self.classify_message(m))
            .collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(default_rules(), FALLBACK_CODE)
    }
}
