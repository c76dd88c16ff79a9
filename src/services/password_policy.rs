use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize, Serializer};

/// 最小文字数
pub const MIN_LENGTH: usize = 12;
/// 最大文字数
pub const MAX_LENGTH: usize = 128;
/// 同一文字の連続許容数
pub const MAX_REPEATING_CHARS: usize = 2;

/// 部分一致で禁止する語句（大文字小文字を区別しない）
const FORBIDDEN_WORDS: &[&str] = &[
    "password",
    "123456",
    "qwerty",
    "admin",
    "login",
    "user",
    "pathpilot",
];

/// 記号として扱う文字
const SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?~`";

/// 連続文字の検出に使う並び（各3文字窓の正順・逆順を検出）
const SEQUENCES: &[&str] = &[
    "abcdefghijklmnopqrstuvwxyz",
    "qwertyuiopasdfghjklzxcvbnm",
    "1234567890",
];

/// 個人情報チェックの対象とする断片の最小文字数
const MIN_PERSONAL_FRAGMENT_LEN: usize = 3;

// スコア配分
const LENGTH_POINTS_PER_CHAR: usize = 2;
const LENGTH_POINTS_CAP: usize = 25;
const CLASS_BONUS: i32 = 10;
const VARIETY_BONUS_PER_CLASS: i32 = 5;
const FORBIDDEN_WORD_PENALTY: i32 = 20;
const SEQUENCE_PENALTY: i32 = 15;
const REPEAT_PENALTY: i32 = 10;

/// 提案パスワードの長さ
const SUGGESTION_LENGTH: usize = MIN_LENGTH + 2;
const SUGGESTION_SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// 評価時に参照するユーザー情報
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// 必須ルール違反
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("パスワードは12文字以上で入力してください")]
    TooShort,
    #[error("パスワードは128文字以内で入力してください")]
    TooLong,
    #[error("英大文字（A-Z）を1文字以上含めてください")]
    MissingUppercase,
    #[error("英小文字（a-z）を1文字以上含めてください")]
    MissingLowercase,
    #[error("数字を1文字以上含めてください")]
    MissingDigit,
    #[error("記号（!@#$%^&* など）を1文字以上含めてください")]
    MissingSymbol,
    #[error("同じ文字を3文字以上連続させることはできません")]
    RepeatingCharacters,
    #[error("よく使われる語句「{0}」を含めることはできません")]
    ForbiddenWord(&'static str),
    #[error("名（ファーストネーム）を含めることはできません")]
    ContainsFirstName,
    #[error("姓（ラストネーム）を含めることはできません")]
    ContainsLastName,
    #[error("メールアドレスの一部を含めることはできません")]
    ContainsEmail,
}

impl Serialize for PolicyViolation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 推奨ルール違反（有効性には影響しない）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyWarning {
    #[error("連続した文字（abc, 123, qwe など）は避けてください")]
    SequentialCharacters,
}

impl Serialize for PolicyWarning {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 強度ラベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PasswordStrength {
    #[serde(rename = "Very Weak")]
    VeryWeak,
    Weak,
    Medium,
    Strong,
    #[serde(rename = "Very Strong")]
    VeryStrong,
}

impl PasswordStrength {
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::VeryStrong,
            60..=79 => Self::Strong,
            40..=59 => Self::Medium,
            20..=39 => Self::Weak,
            _ => Self::VeryWeak,
        }
    }
}

/// パスワード評価結果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordValidationResult {
    pub is_valid: bool,
    pub score: u8,
    pub strength: PasswordStrength,
    pub errors: Vec<PolicyViolation>,
    pub warnings: Vec<PolicyWarning>,
    pub suggestions: Vec<String>,
    pub requirements: Vec<String>,
}

/// パスワードポリシー
///
/// 副作用のない純粋な評価のみを行う。
/// 同じ入力に対しては常に同じ結果を返す。
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordPolicy;

impl PasswordPolicy {
    pub fn new() -> Self {
        Self
    }

    /// パスワードを評価
    pub fn evaluate(&self, password: &str, context: &UserContext) -> PasswordValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut suggestions = Suggestions::default();

        let length = password.chars().count();
        if length < MIN_LENGTH {
            errors.push(PolicyViolation::TooShort);
            suggestions.push("パスワードを長くしてください");
        }
        if length > MAX_LENGTH {
            errors.push(PolicyViolation::TooLong);
        }

        let classes = CharClasses::of(password);
        if !classes.upper {
            errors.push(PolicyViolation::MissingUppercase);
            suggestions.push("英大文字を追加してください");
        }
        if !classes.lower {
            errors.push(PolicyViolation::MissingLowercase);
            suggestions.push("英小文字を追加してください");
        }
        if !classes.digit {
            errors.push(PolicyViolation::MissingDigit);
            suggestions.push("数字を追加してください");
        }
        if !classes.symbol {
            errors.push(PolicyViolation::MissingSymbol);
            suggestions.push("!@#$%^&* などの記号を追加してください");
        }

        if has_repeating_run(password) {
            errors.push(PolicyViolation::RepeatingCharacters);
            suggestions.push("同じ文字を何度も繰り返さないでください");
        }

        let lowered = password.to_lowercase();
        for word in forbidden_words_in(&lowered) {
            errors.push(PolicyViolation::ForbiddenWord(word));
            suggestions.push("よく使われる単語や辞書に載っている語句は避けてください");
        }

        if contains_fragment(&lowered, context.first_name.as_deref()) {
            errors.push(PolicyViolation::ContainsFirstName);
            suggestions.push("個人情報をパスワードに使わないでください");
        }
        if contains_fragment(&lowered, context.last_name.as_deref()) {
            errors.push(PolicyViolation::ContainsLastName);
            suggestions.push("個人情報をパスワードに使わないでください");
        }
        let email_local = context
            .email
            .as_deref()
            .and_then(|email| email.split('@').next());
        if contains_fragment(&lowered, email_local) {
            errors.push(PolicyViolation::ContainsEmail);
            suggestions.push("メールアドレスやユーザー名をパスワードに使わないでください");
        }

        if has_sequential_run(&lowered) {
            warnings.push(PolicyWarning::SequentialCharacters);
            suggestions.push("文字の並びを崩して推測されにくくしてください");
        }

        let score = score(password);

        PasswordValidationResult {
            is_valid: errors.is_empty(),
            score,
            strength: PasswordStrength::from_score(score),
            errors,
            warnings,
            suggestions: suggestions.into_vec(),
            requirements: self.requirements(),
        }
    }

    /// 表示用の要件一覧（順序固定）
    pub fn requirements(&self) -> Vec<String> {
        vec![
            format!("{MIN_LENGTH}文字以上"),
            "英大文字（A-Z）を1文字以上".to_string(),
            "英小文字（a-z）を1文字以上".to_string(),
            "数字を1文字以上".to_string(),
            "記号（!@#$%^&*）を1文字以上".to_string(),
            format!("同じ文字の連続は{MAX_REPEATING_CHARS}文字まで"),
            "よく使われる語句や個人情報を含まないこと".to_string(),
            "連続した文字（abc, 123, qwe）を避けること".to_string(),
        ]
    }

    /// ポリシーを満たすランダムなパスワードを提案
    pub fn generate_suggestion(&self) -> String {
        const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
        const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        const DIGITS: &[u8] = b"0123456789";

        let all: Vec<u8> = [LOWER, UPPER, DIGITS, SUGGESTION_SYMBOLS].concat();
        let mut rng = rand::thread_rng();

        loop {
            let mut chars: Vec<u8> = [LOWER, UPPER, DIGITS, SUGGESTION_SYMBOLS]
                .iter()
                .map(|set| set[rng.gen_range(0..set.len())])
                .collect();
            while chars.len() < SUGGESTION_LENGTH {
                chars.push(all[rng.gen_range(0..all.len())]);
            }
            chars.shuffle(&mut rng);

            let candidate: String = chars.into_iter().map(char::from).collect();
            if self.evaluate(&candidate, &UserContext::default()).is_valid {
                return candidate;
            }
        }
    }
}

/// 重複を除いた提案リスト（挿入順を維持）
#[derive(Default)]
struct Suggestions(Vec<String>);

impl Suggestions {
    fn push(&mut self, suggestion: &str) {
        if !self.0.iter().any(|s| s == suggestion) {
            self.0.push(suggestion.to_string());
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
struct CharClasses {
    lower: bool,
    upper: bool,
    digit: bool,
    symbol: bool,
}

impl CharClasses {
    fn of(password: &str) -> Self {
        Self {
            lower: password.chars().any(|c| c.is_ascii_lowercase()),
            upper: password.chars().any(|c| c.is_ascii_uppercase()),
            digit: password.chars().any(|c| c.is_ascii_digit()),
            symbol: password.chars().any(|c| SYMBOLS.contains(c)),
        }
    }

    fn count(&self) -> i32 {
        [self.lower, self.upper, self.digit, self.symbol]
            .into_iter()
            .filter(|present| *present)
            .count() as i32
    }
}

fn score(password: &str) -> u8 {
    if password.is_empty() {
        return 0;
    }

    let length = password.chars().count();
    let mut score = length
        .saturating_mul(LENGTH_POINTS_PER_CHAR)
        .min(LENGTH_POINTS_CAP) as i32;

    let classes = CharClasses::of(password);
    score += classes.count() * (CLASS_BONUS + VARIETY_BONUS_PER_CLASS);

    let lowered = password.to_lowercase();
    if forbidden_words_in(&lowered).next().is_some() {
        score -= FORBIDDEN_WORD_PENALTY;
    }
    if has_sequential_run(&lowered) {
        score -= SEQUENCE_PENALTY;
    }
    if has_repeating_run(password) {
        score -= REPEAT_PENALTY;
    }

    score.clamp(0, 100) as u8
}

fn forbidden_words_in(lowered: &str) -> impl Iterator<Item = &'static str> + '_ {
    FORBIDDEN_WORDS
        .iter()
        .copied()
        .filter(move |word| lowered.contains(word))
}

/// 同一文字（大文字小文字を区別しない、非ASCII含む）が MAX_REPEATING_CHARS を超えて連続するか
fn has_repeating_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(MAX_REPEATING_CHARS + 1).any(|window| {
        window
            .iter()
            .all(|c| c.to_lowercase().eq(window[0].to_lowercase()))
    })
}

fn has_sequential_run(lowered: &str) -> bool {
    SEQUENCES.iter().any(|sequence| {
        let bytes = sequence.as_bytes();
        bytes.windows(3).any(|window| {
            let forward: String = window.iter().map(|b| char::from(*b)).collect();
            let backward: String = window.iter().rev().map(|b| char::from(*b)).collect();
            lowered.contains(&forward) || lowered.contains(&backward)
        })
    })
}

fn contains_fragment(lowered: &str, fragment: Option<&str>) -> bool {
    match fragment.map(|f| f.trim().to_lowercase()) {
        Some(fragment) if fragment.chars().count() >= MIN_PERSONAL_FRAGMENT_LEN => {
            lowered.contains(&fragment)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(password: &str) -> PasswordValidationResult {
        PasswordPolicy::new().evaluate(password, &UserContext::default())
    }

    fn context(email: &str, first_name: &str, last_name: &str) -> UserContext {
        UserContext {
            email: Some(email.to_string()),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
        }
    }

    #[test]
    fn test_forbidden_word_is_rejected_case_insensitively() {
        let result = evaluate("Password123!");
        assert!(!result.is_valid);
        assert!(
            result
                .errors
                .contains(&PolicyViolation::ForbiddenWord("password"))
        );
    }

    #[test]
    fn test_strong_password_is_accepted() {
        let result = evaluate("Tr0ub4dor&3xyz9Q");
        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert!(result.score >= 60, "score: {}", result.score);
        assert!(matches!(
            result.strength,
            PasswordStrength::Strong | PasswordStrength::VeryStrong
        ));
        // "xyz" は推奨ルールの警告のみ
        assert_eq!(result.warnings, vec![PolicyWarning::SequentialCharacters]);
    }

    #[test]
    fn test_empty_password_reports_every_class() {
        let result = evaluate("");
        assert!(!result.is_valid);
        assert_eq!(result.score, 0);
        assert_eq!(result.strength, PasswordStrength::VeryWeak);
        for violation in [
            PolicyViolation::TooShort,
            PolicyViolation::MissingUppercase,
            PolicyViolation::MissingLowercase,
            PolicyViolation::MissingDigit,
            PolicyViolation::MissingSymbol,
        ] {
            assert!(result.errors.contains(&violation), "{violation:?}");
        }
    }

    #[test]
    fn test_length_bounds() {
        let too_long = format!("Aa1!{}", "xk7$".repeat(32));
        assert!(too_long.chars().count() > MAX_LENGTH);
        assert!(evaluate(&too_long).errors.contains(&PolicyViolation::TooLong));

        let at_max: String = "Xk7$".repeat(MAX_LENGTH / 4);
        assert_eq!(at_max.chars().count(), MAX_LENGTH);
        assert!(evaluate(&at_max).is_valid);

        let at_min: String = "Xk7$".repeat(MIN_LENGTH / 4);
        assert!(evaluate(&at_min).is_valid);
        assert!(evaluate(&at_min[1..]).errors.contains(&PolicyViolation::TooShort));
    }

    #[test]
    fn test_repeating_run_of_three_is_rejected() {
        let result = evaluate("Goood#Moon77Q");
        assert!(result.errors.contains(&PolicyViolation::RepeatingCharacters));

        // 大文字小文字を区別しない
        let result = evaluate("XaAa7#Kwnq9Rt");
        assert!(result.errors.contains(&PolicyViolation::RepeatingCharacters));

        // 2連続までは許容
        let result = evaluate("Goo9d#Moon77Q");
        assert!(!result.errors.contains(&PolicyViolation::RepeatingCharacters));
    }

    #[test]
    fn test_repeating_run_folds_non_ascii_case() {
        let result = evaluate("Xk7$ééÉ9Rtqz");
        assert!(result.errors.contains(&PolicyViolation::RepeatingCharacters));

        let result = evaluate("Xk7$éÉ9Rtqzw");
        assert!(!result.errors.contains(&PolicyViolation::RepeatingCharacters));
    }

    #[test]
    fn test_personal_information_is_rejected() {
        let policy = PasswordPolicy::new();

        let result = policy.evaluate("Sakura#2024Rain", &context("drop@x.com", "Sakura", "Ito"));
        assert_eq!(result.errors, vec![PolicyViolation::ContainsFirstName]);

        let result = policy.evaluate("Sakura#2024Rain", &context("rain@x.com", "Mei", "Ito"));
        assert_eq!(result.errors, vec![PolicyViolation::ContainsEmail]);

        let result = policy.evaluate("Mori#2024Rainy", &context("drop@x.com", "Mei", "MORI"));
        assert_eq!(result.errors, vec![PolicyViolation::ContainsLastName]);
    }

    #[test]
    fn test_short_personal_fragments_are_ignored() {
        let result =
            PasswordPolicy::new().evaluate("Str0ng&Pass1234", &context("a@x.com", "A", "B"));
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_sequence_is_warning_only() {
        let result = evaluate("Kw9#abcMnVt2");
        assert!(result.is_valid);
        assert_eq!(result.warnings, vec![PolicyWarning::SequentialCharacters]);

        // 逆順・キーボード配列も検出
        assert!(!evaluate("Kw9#cbaMnVt2").warnings.is_empty());
        assert!(!evaluate("Kw9#ASDMnVt2").warnings.is_empty());
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let policy = PasswordPolicy::new();
        let ctx = context("erin@example.com", "Erin", "Sato");
        let a = policy.evaluate("N3w&Secure#Phrase", &ctx);
        let b = policy.evaluate("N3w&Secure#Phrase", &ctx);
        assert_eq!(a.is_valid, b.is_valid);
        assert_eq!(a.score, b.score);
        assert_eq!(a.strength, b.strength);
        assert_eq!(a.errors, b.errors);
        assert_eq!(a.suggestions, b.suggestions);
    }

    #[test]
    fn test_score_is_monotonic_in_length() {
        let base = "Xk7$".repeat(8);
        let mut previous = 0;
        for length in 4..=base.len() {
            let score = evaluate(&base[..length]).score;
            assert!(score >= previous, "length {length}: {score} < {previous}");
            previous = score;
        }
        assert_eq!(previous, 85);
    }

    #[test]
    fn test_strength_thresholds() {
        assert_eq!(PasswordStrength::from_score(100), PasswordStrength::VeryStrong);
        assert_eq!(PasswordStrength::from_score(80), PasswordStrength::VeryStrong);
        assert_eq!(PasswordStrength::from_score(79), PasswordStrength::Strong);
        assert_eq!(PasswordStrength::from_score(60), PasswordStrength::Strong);
        assert_eq!(PasswordStrength::from_score(59), PasswordStrength::Medium);
        assert_eq!(PasswordStrength::from_score(40), PasswordStrength::Medium);
        assert_eq!(PasswordStrength::from_score(39), PasswordStrength::Weak);
        assert_eq!(PasswordStrength::from_score(20), PasswordStrength::Weak);
        assert_eq!(PasswordStrength::from_score(19), PasswordStrength::VeryWeak);
    }

    #[test]
    fn test_suggestions_are_deduplicated() {
        let result = evaluate("adminuser");
        let unique: std::collections::HashSet<_> = result.suggestions.iter().collect();
        assert_eq!(unique.len(), result.suggestions.len());
    }

    #[test]
    fn test_result_serializes_camel_case_with_messages() {
        let json = serde_json::to_value(evaluate("Password123!")).unwrap();
        assert_eq!(json["isValid"], false);
        assert_eq!(json["strength"], "Medium");
        let errors = json["errors"].as_array().unwrap();
        assert!(errors.iter().any(|e| e.as_str().unwrap().contains("password")));
        assert_eq!(json["requirements"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_generated_suggestion_passes_policy() {
        let policy = PasswordPolicy::new();
        for _ in 0..20 {
            let suggestion = policy.generate_suggestion();
            assert_eq!(suggestion.chars().count(), SUGGESTION_LENGTH);
            assert!(policy.evaluate(&suggestion, &UserContext::default()).is_valid);
        }
    }
}
