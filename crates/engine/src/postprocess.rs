//! Leichtgewichtiger Text-Nachbearbeiter fuer ASR-Ausgaben (§4.3, §8)
//!
//! Reihenfolge: Whitespace trimmen; aufeinanderfolgende Dop­pel­woerter
//! (case-insensitive) ueber und innerhalb von Chunks zusammenziehen;
//! "It is " am Satzanfang zu "It's " normalisieren; ersten Buchstaben und
//! den ersten Buchstaben nach `.`/`!`/`?` gross schreiben; ein fuehrendes
//! literales "Okay." entfernen, falls vorhanden.

pub fn post_process(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    text = strip_leading_okay(&text);
    text = collapse_duplicate_words(&text);
    text = normalize_it_is(&text);
    text = capitalize_sentences(&text);
    text
}

fn strip_leading_okay(text: &str) -> String {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("Okay.") {
        rest.trim_start().to_string()
    } else {
        text.to_string()
    }
}

fn collapse_duplicate_words(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut out: Vec<&str> = Vec::with_capacity(words.len());
    for word in words {
        let is_dup = out
            .last()
            .map(|prev: &&str| prev.eq_ignore_ascii_case(word))
            .unwrap_or(false);
        if !is_dup {
            out.push(word);
        }
    }
    out.join(" ")
}

fn normalize_it_is(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        if let Some(pos) = find_it_is_at_sentence_start(rest) {
            result.push_str(&rest[..pos]);
            result.push_str("It's ");
            rest = &rest[pos + "It is ".len()..];
        } else {
            result.push_str(rest);
            break;
        }
    }
    result
}

fn find_it_is_at_sentence_start(text: &str) -> Option<usize> {
    let lower = text.to_ascii_lowercase();
    let bytes = text.as_bytes();
    let mut idx = 0;
    while let Some(rel) = lower[idx..].find("it is ") {
        let pos = idx + rel;
        let at_start = pos == 0
            || matches!(bytes.get(pos.wrapping_sub(1)), Some(b'.') | Some(b'!') | Some(b'?'))
            || bytes.get(pos.wrapping_sub(2)) == Some(&b' ')
                && matches!(bytes.get(pos.wrapping_sub(3)), Some(b'.') | Some(b'!') | Some(b'?'));
        if pos == 0 || at_start {
            return Some(pos);
        }
        idx = pos + 1;
    }
    None
}

fn capitalize_sentences(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    let mut capitalize_next = true;
    for i in 0..chars.len() {
        if capitalize_next && chars[i].is_alphabetic() {
            chars[i] = chars[i].to_ascii_uppercase();
            capitalize_next = false;
        } else if matches!(chars[i], '.' | '!' | '?') {
            capitalize_next = true;
        } else if !chars[i].is_whitespace() {
            capitalize_next = false;
        }
    }
    chars.into_iter().collect()
}

/// Vergleicht den post-prozessierten Text eines neuen, ueberlappenden Chunks
/// gegen den kumulativen bisherigen Transkript-Text `cumulative` und liefert
/// `(neues kumulatives Transkript, neues Delta)`.
///
/// Zwei aufeinanderfolgende VAD-Chunks teilen sich `overlap_ms` Audio an der
/// Grenze, nicht literalen Text am Anfang — `current` ist daher im
/// Allgemeinen kein Praefix-Fortsatz von `cumulative`, sondern re-transkribiert
/// das ueberlappende Wortende des Vorgaengers erneut (ggf. mit anderer
/// Gross-/Kleinschreibung oder Interpunktion). Diese Funktion sucht die
/// laengste wortweise Ueberlappung zwischen dem Ende von `cumulative` und dem
/// Anfang von `current` (case-insensitiv, interpunktionsblind) und haengt nur
/// die ueber die Ueberlappung hinausgehenden Woerter an (§4.3, §8 Szenario 4).
pub fn merge_cumulative_delta(cumulative: &str, current: &str) -> (String, String) {
    if cumulative.is_empty() {
        return (current.to_string(), current.to_string());
    }
    if current.is_empty() {
        return (cumulative.to_string(), String::new());
    }

    let cum_words: Vec<&str> = cumulative.split_whitespace().collect();
    let cur_words: Vec<&str> = current.split_whitespace().collect();
    let max_overlap = cum_words.len().min(cur_words.len());

    let mut overlap = 0;
    for k in (1..=max_overlap).rev() {
        let cum_tail = &cum_words[cum_words.len() - k..];
        let cur_head = &cur_words[..k];
        if cum_tail
            .iter()
            .zip(cur_head.iter())
            .all(|(a, b)| normalize_word(a) == normalize_word(b))
        {
            overlap = k;
            break;
        }
    }

    let delta_words = &cur_words[overlap..];
    if delta_words.is_empty() {
        return (cumulative.to_string(), String::new());
    }

    let delta = delta_words.join(" ");
    let new_cumulative = format!("{cumulative} {delta}");
    (new_cumulative, delta)
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmt_whitespace() {
        assert_eq!(post_process("  hello world  "), "Hello world");
    }

    #[test]
    fn entfernt_doppelte_woerter_case_insensitive() {
        assert_eq!(post_process("the the birch canoe"), "The birch canoe");
    }

    #[test]
    fn normalisiert_it_is_am_satzanfang() {
        assert_eq!(post_process("it is raining today"), "It's raining today");
    }

    #[test]
    fn lsst_it_is_mitten_im_satz_unveraendert() {
        let out = post_process("I think it is raining");
        assert!(out.contains("it is raining") || out.contains("It is raining"));
    }

    #[test]
    fn entfernt_fuehrendes_okay_artefakt() {
        assert_eq!(post_process("Okay. Hello there"), "Hello there");
    }

    #[test]
    fn grossschreibung_nach_satzzeichen() {
        assert_eq!(post_process("hello. world! there? ok"), "Hello. World! There? Ok");
    }

    #[test]
    fn erster_chunk_wird_komplett_als_delta_und_kumulativ_uebernommen() {
        let (cumulative, delta) = merge_cumulative_delta("", "Hello world");
        assert_eq!(cumulative, "Hello world");
        assert_eq!(delta, "Hello world");
    }

    #[test]
    fn ueberlappendes_wort_wird_nicht_dupliziert() {
        // Chunk 1 endet mitten im Satz mit "...the smooth", Chunk 2
        // re-transkribiert das ueberlappende Wort am Anfang ("Smooth")
        // mit abweichender Gross-/Kleinschreibung.
        let (cumulative, delta) =
            merge_cumulative_delta("The birch canoe slid on the smooth", "Smooth planks.");
        assert_eq!(cumulative, "The birch canoe slid on the smooth planks.");
        assert_eq!(delta, "planks.");
    }

    #[test]
    fn mehrwortige_ueberlappung_wird_komplett_erkannt() {
        let (cumulative, delta) =
            merge_cumulative_delta("on the smooth planks", "the smooth planks today");
        assert_eq!(cumulative, "on the smooth planks today");
        assert_eq!(delta, "today");
    }

    #[test]
    fn ohne_ueberlappung_wird_ganzer_chunk_angehaengt() {
        let (cumulative, delta) = merge_cumulative_delta("Hello there", "Completely unrelated.");
        assert_eq!(cumulative, "Hello there Completely unrelated.");
        assert_eq!(delta, "Completely unrelated.");
    }

    #[test]
    fn identischer_chunk_erzeugt_kein_delta() {
        let (cumulative, delta) =
            merge_cumulative_delta("the smooth planks", "the smooth planks");
        assert_eq!(cumulative, "the smooth planks");
        assert_eq!(delta, "");
    }

    #[test]
    fn dedup_ueber_overlap_hinweg() {
        let combined = "the smooth planks smooth planks";
        assert_eq!(collapse_duplicate_words(combined), combined);
        assert_eq!(
            collapse_duplicate_words("smooth planks smooth planks"),
            "smooth planks smooth planks"
        );
    }
}
