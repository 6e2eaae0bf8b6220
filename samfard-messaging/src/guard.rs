use once_cell::sync::Lazy;
use regex::Regex;

/// Which contact-exchange mechanism a blocked message appeared to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationCategory {
    PhoneNumber,
    EmailAddress,
    OffPlatformHandle,
}

/// Outcome of scanning one message body. A violation carries the category
/// and the explanation shown inline to the author; nothing about the
/// attempt is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Clean,
    Violation {
        category: ViolationCategory,
        user_message: &'static str,
    },
}

const PHONE_MESSAGE: &str =
    "Your message looks like it contains a phone number. Contact details are shared automatically once the booking is approved.";
const EMAIL_MESSAGE: &str =
    "Your message looks like it contains an email address. Contact details are shared automatically once the booking is approved.";
const HANDLE_MESSAGE: &str =
    "Asking to continue the conversation outside the platform is not allowed before contact details are unlocked.";

// Digits spelled out in Swedish and English; obfuscated numbers arrive as
// word runs ("noll sju tre ...", "zero seven zero ...").
const DIGIT_WORDS: &[(&str, char)] = &[
    ("noll", '0'),
    ("ett", '1'),
    ("två", '2'),
    ("tva", '2'),
    ("tre", '3'),
    ("fyra", '4'),
    ("fem", '5'),
    ("sex", '6'),
    ("sju", '7'),
    ("åtta", '8'),
    ("atta", '8'),
    ("nio", '9'),
    ("zero", '0'),
    ("one", '1'),
    ("two", '2'),
    ("three", '3'),
    ("four", '4'),
    ("five", '5'),
    ("six", '6'),
    ("seven", '7'),
    ("eight", '8'),
    ("nine", '9'),
];

const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

// Times and dates are digit runs too; carve them out before the phone scan
// so "kl 14:00" and "2025-06-14" stay clean.
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}[:.]\d{2}\b").expect("time regex"));
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("date regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").expect("email regex")
});
static EMAIL_AT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s(?:at|snabel-a)\s").expect("email at regex"));
static EMAIL_DOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s(?:dot|punkt)\s").expect("email dot regex"));

static PLATFORM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:instagram|insta|snapchat|snap|whatsapp|telegram|signal|messenger|facebook|fb|viber|kik)\b")
        .expect("platform regex")
});
static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z0-9_.]{3,}").expect("handle regex"));
static OFF_PLATFORM_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:ring mig|ring mej|mejla mig|maila mig|sms:?a mig|hör av dig på|kontakta mig på|call me on|text me on|email me at|dm me)\b",
    )
    .expect("phrase regex")
});

/// Scans a sanitized message body for contact-information leakage.
///
/// The detection is a deterrent, not a security boundary: simple obfuscation
/// (separators, spelled-out digits, digit-lookalike letters) is caught,
/// determined evasion is not, and that is accepted. The carve-outs exist so
/// ordinary ride chatter about times, dates and prices never trips it.
pub fn scan(text: &str) -> GuardVerdict {
    if detect_email(text) {
        return GuardVerdict::Violation {
            category: ViolationCategory::EmailAddress,
            user_message: EMAIL_MESSAGE,
        };
    }
    if detect_phone(text) {
        return GuardVerdict::Violation {
            category: ViolationCategory::PhoneNumber,
            user_message: PHONE_MESSAGE,
        };
    }
    if detect_handle(text) {
        return GuardVerdict::Violation {
            category: ViolationCategory::OffPlatformHandle,
            user_message: HANDLE_MESSAGE,
        };
    }
    GuardVerdict::Clean
}

fn detect_email(text: &str) -> bool {
    if EMAIL_RE.is_match(text) {
        return true;
    }
    // Spelled-out substitutions: "test at example dot com".
    let unfolded = EMAIL_AT_RE.replace_all(text, "@");
    let unfolded = EMAIL_DOT_RE.replace_all(&unfolded, ".");
    EMAIL_RE.is_match(&unfolded)
}

fn detect_handle(text: &str) -> bool {
    if OFF_PLATFORM_PHRASE_RE.is_match(text) {
        return true;
    }
    PLATFORM_RE.is_match(text) && HANDLE_RE.is_match(text)
}

fn detect_phone(text: &str) -> bool {
    let lowered = text.to_lowercase();
    let carved = DATE_RE.replace_all(&lowered, " ");
    let carved = TIME_RE.replace_all(&carved, " ");

    let mut run = String::new();
    for token in carved.split_whitespace() {
        if let Some(digit) = digit_word(token) {
            run.push(digit);
            continue;
        }
        match digit_chunk(token) {
            Chunk::Digits(digits) => run.push_str(&digits),
            Chunk::Separator => {}
            Chunk::Other => {
                if phone_length(&run) {
                    return true;
                }
                run.clear();
            }
        }
    }
    phone_length(&run)
}

fn phone_length(run: &str) -> bool {
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&run.len())
}

fn digit_word(token: &str) -> Option<char> {
    let stripped = token.trim_matches(|c: char| !c.is_alphanumeric());
    DIGIT_WORDS
        .iter()
        .find(|(word, _)| *word == stripped)
        .map(|(_, digit)| *digit)
}

enum Chunk {
    /// Token reduced to the digits it spells, lookalike letters included.
    Digits(String),
    /// Pure separator noise between digit groups, run continues across it.
    Separator,
    Other,
}

fn digit_chunk(token: &str) -> Chunk {
    let mut digits = String::new();
    let mut has_real_digit = false;
    for c in token.chars() {
        match c {
            '0'..='9' => {
                has_real_digit = true;
                digits.push(c);
            }
            'o' => digits.push('0'),
            'i' | 'l' => digits.push('1'),
            '-' | '.' | '(' | ')' | '/' | ',' | '+' => {}
            _ => return Chunk::Other,
        }
    }
    if has_real_digit {
        Chunk::Digits(digits)
    } else if digits.is_empty() {
        Chunk::Separator
    } else {
        // Letters-only lookalike token ("oil"); not digit evidence.
        Chunk::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(text: &str) -> Option<ViolationCategory> {
        match scan(text) {
            GuardVerdict::Clean => None,
            GuardVerdict::Violation { category, .. } => Some(category),
        }
    }

    #[test]
    fn test_times_dates_and_prices_are_clean() {
        assert_eq!(category("Vi möts kl 14:00 imorgon"), None);
        assert_eq!(category("Funkar 2025-06-14 kl 08.30?"), None);
        assert_eq!(category("Priset är 150 kr per person"), None);
        assert_eq!(category("Jag har 2 platser kvar"), None);
    }

    #[test]
    fn test_plain_phone_number_is_flagged() {
        assert_eq!(
            category("ring 070-1234567"),
            Some(ViolationCategory::PhoneNumber)
        );
        assert_eq!(
            category("mitt nummer är 0701234567"),
            Some(ViolationCategory::PhoneNumber)
        );
    }

    #[test]
    fn test_grouped_and_spaced_digits_are_flagged() {
        assert_eq!(
            category("nås på 070 123 45 67"),
            Some(ViolationCategory::PhoneNumber)
        );
        assert_eq!(
            category("0 7 0 1 2 3 4 5 6 7"),
            Some(ViolationCategory::PhoneNumber)
        );
    }

    #[test]
    fn test_spelled_out_digits_are_flagged() {
        assert_eq!(
            category("zero seven zero one two three four five six seven"),
            Some(ViolationCategory::PhoneNumber)
        );
        assert_eq!(
            category("noll sju noll ett två tre fyra fem sex sju"),
            Some(ViolationCategory::PhoneNumber)
        );
    }

    #[test]
    fn test_mixed_words_and_digits_are_flagged() {
        assert_eq!(
            category("noll sju tre 123 45 67"),
            Some(ViolationCategory::PhoneNumber)
        );
    }

    #[test]
    fn test_lookalike_letters_inside_digit_runs_are_flagged() {
        assert_eq!(
            category("o7o 123 45 67"),
            Some(ViolationCategory::PhoneNumber)
        );
    }

    #[test]
    fn test_email_address_is_flagged() {
        assert_eq!(
            category("mejla mig på test@example.com"),
            Some(ViolationCategory::EmailAddress)
        );
    }

    #[test]
    fn test_spelled_out_email_is_flagged() {
        assert_eq!(
            category("skriv till test at example dot com"),
            Some(ViolationCategory::EmailAddress)
        );
    }

    #[test]
    fn test_platform_handle_is_flagged() {
        assert_eq!(
            category("add me on snapchat @rider99"),
            Some(ViolationCategory::OffPlatformHandle)
        );
    }

    #[test]
    fn test_off_platform_phrase_is_flagged() {
        assert_eq!(
            category("ring mig när du är framme"),
            Some(ViolationCategory::OffPlatformHandle)
        );
    }

    #[test]
    fn test_platform_word_alone_is_clean() {
        assert_eq!(category("Jag såg annonsen på facebook"), None);
    }

    #[test]
    fn test_long_serials_are_not_phone_numbers() {
        // 16 digits is outside the plausible phone range.
        assert_eq!(category("ordernummer 1234567890123456"), None);
    }

    #[test]
    fn test_violation_carries_a_category_specific_message() {
        match scan("ring 070-1234567") {
            GuardVerdict::Violation { user_message, .. } => {
                assert!(user_message.contains("phone number"));
            }
            GuardVerdict::Clean => panic!("expected a violation"),
        }
    }
}
