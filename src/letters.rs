use std::env;

/// Locales that have a dedicated letter set (or are the default).
pub const AVAILABLE_LOCALES: [&str; 4] = ["en", "nb", "nn", "no"];

pub const DEFAULT_LOCALE: &str = "en";

const LATIN: [char; 26] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z',
];

const NORWEGIAN_EXTRA: [char; 3] = ['æ', 'ø', 'å'];

/// Ordered letters the player has to type, in typing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterSet {
    pub locale: String,
    letters: Vec<char>,
}

impl LetterSet {
    pub fn for_locale(locale: &str) -> Self {
        let letters = match locale {
            "nb" | "nn" | "no" => LATIN.iter().chain(NORWEGIAN_EXTRA.iter()).copied().collect(),
            _ => LATIN.to_vec(),
        };

        Self {
            locale: locale.to_string(),
            letters,
        }
    }

    pub fn letters(&self) -> &[char] {
        &self.letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<char> {
        self.letters.get(idx).copied()
    }
}

impl Default for LetterSet {
    fn default() -> Self {
        Self::for_locale(DEFAULT_LOCALE)
    }
}

/// Pick the letter set for the first preferred locale that is available.
/// Falls back to the default locale when nothing matches.
pub fn select_letter_set<S: AsRef<str>>(preferences: &[S], available: &[&str]) -> LetterSet {
    let locale = preferences
        .iter()
        .map(|pref| pref.as_ref())
        .find(|pref: &&str| available.contains(pref))
        .unwrap_or(DEFAULT_LOCALE);

    LetterSet::for_locale(locale)
}

/// Reduce a POSIX or BCP 47 locale string to its lowercase language subtag.
/// `nb_NO.UTF-8` becomes `nb`, `en-US` becomes `en`. `C` and `POSIX` carry no language.
pub fn normalize_locale(raw: &str) -> Option<String> {
    let lang = raw
        .split(['_', '-', '.', '@'])
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    if lang.eq_ignore_ascii_case("c") || lang.eq_ignore_ascii_case("posix") {
        return None;
    }

    Some(lang.to_lowercase())
}

/// Build the ordered preference list from already-read locale variables.
/// `language` is the colon separated `LANGUAGE` list, the rest are single values.
pub fn preferences_from_vars(
    language: Option<&str>,
    lc_all: Option<&str>,
    lc_messages: Option<&str>,
    lang: Option<&str>,
) -> Vec<String> {
    let mut prefs: Vec<String> = Vec::new();

    let candidates = language
        .into_iter()
        .flat_map(|l| l.split(':'))
        .chain(lc_all)
        .chain(lc_messages)
        .chain(lang);

    for raw in candidates {
        if let Some(norm) = normalize_locale(raw) {
            if !prefs.contains(&norm) {
                prefs.push(norm);
            }
        }
    }

    prefs
}

/// Preference list for the current process, read from the locale environment.
pub fn preferred_locales() -> Vec<String> {
    let language = env::var("LANGUAGE").ok();
    let lc_all = env::var("LC_ALL").ok();
    let lc_messages = env::var("LC_MESSAGES").ok();
    let lang = env::var("LANG").ok();

    preferences_from_vars(
        language.as_deref(),
        lc_all.as_deref(),
        lc_messages.as_deref(),
        lang.as_deref(),
    )
}
