//! Language detection: Devanagari script ratio first, then a hinglish
//! marker lexicon over latin-script tokens.

use rv_domain::voc::DetectedLanguage;

/// Romanized-Hindi markers common in Indian retail chat. Matched on
/// whole lowercased tokens.
const HINGLISH_MARKERS: &[&str] = &[
    "hai", "nahi", "nahin", "kya", "kyu", "kyun", "kaise", "kab", "kahan", "karo",
    "karna", "kiya", "mera", "meri", "mere", "mujhe", "muje", "aap", "aapka", "tum",
    "bhai", "yaar", "acha", "accha", "theek", "thik", "paisa", "paise", "wapas",
    "chahiye", "hoga", "hogi", "milega", "chalega", "bata", "batao", "bolo", "jaldi",
    "abhi", "kal", "bhej", "bhejo", "gaya", "gayi", "raha", "rahi",
];

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

/// Detect the message's languages, primary first.
pub fn detect(text: &str) -> Vec<DetectedLanguage> {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return vec![DetectedLanguage {
            code: "en".into(),
            confidence: 0.9,
            script: "latin".into(),
        }];
    }

    let devanagari = letters.iter().filter(|c| is_devanagari(**c)).count();
    let ratio = devanagari as f64 / letters.len() as f64;
    if ratio > 0.4 {
        return vec![DetectedLanguage {
            code: "hi".into(),
            confidence: (0.6 + ratio * 0.4).min(1.0),
            script: "devanagari".into(),
        }];
    }

    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if !words.is_empty() {
        let markers = words
            .iter()
            .filter(|w| HINGLISH_MARKERS.contains(&w.as_str()))
            .count();
        let marker_ratio = markers as f64 / words.len() as f64;
        if marker_ratio > 0.15 {
            return vec![
                DetectedLanguage {
                    code: "hinglish".into(),
                    confidence: (0.5 + marker_ratio).min(1.0),
                    script: "latin".into(),
                },
                DetectedLanguage {
                    code: "en".into(),
                    confidence: (1.0 - marker_ratio).max(0.3),
                    script: "latin".into(),
                },
            ];
        }
    }

    vec![DetectedLanguage {
        code: "en".into(),
        confidence: 0.9,
        script: "latin".into(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_english() {
        let langs = detect("where is my order?");
        assert_eq!(langs.len(), 1);
        assert_eq!(langs[0].code, "en");
        assert_eq!(langs[0].script, "latin");
    }

    #[test]
    fn devanagari_detected_as_hindi() {
        let langs = detect("मेरा ऑर्डर कहाँ है");
        assert_eq!(langs[0].code, "hi");
        assert_eq!(langs[0].script, "devanagari");
        assert!(langs[0].confidence > 0.9);
    }

    #[test]
    fn hinglish_gets_english_secondary() {
        let langs = detect("mera order kab milega bhai");
        assert_eq!(langs.len(), 2);
        assert_eq!(langs[0].code, "hinglish");
        assert_eq!(langs[1].code, "en");
        assert!(langs[0].confidence > 0.5);
        assert!(langs[1].confidence >= 0.3);
    }

    #[test]
    fn sparse_markers_stay_english() {
        // One marker in a long English sentence is below the 0.15 bar.
        let langs = detect("I would really like to know when my parcel arrives hai");
        assert_eq!(langs[0].code, "en");
    }

    #[test]
    fn digits_only_defaults_english() {
        let langs = detect("1234567890");
        assert_eq!(langs[0].code, "en");
    }
}
