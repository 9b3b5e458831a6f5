//! Unicode normalization of attribute values.
//!
//! Decodes HTML character references, maps space separators to a plain
//! space, applies NFKC, folds quote and dash variants, and removes control,
//! format and private-use characters (zero width joiner excepted).

use unicode_normalization::UnicodeNormalization;

const ZERO_WIDTH_JOINER: char = '\u{200D}';

fn is_space_separator(c: char) -> bool {
    matches!(
        c,
        ' ' | '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

fn single_quote(c: char) -> bool {
    matches!(
        c,
        '\u{0027}'
            | '\u{0060}'
            | '\u{00B4}'
            | '\u{02B9}'
            | '\u{02BC}'
            | '\u{055A}'
            | '\u{07F4}'
            | '\u{07F5}'
            | '\u{2018}'..='\u{201B}'
            | '\u{2032}'
            | '\u{2035}'
            | '\u{2039}'
            | '\u{203A}'
            | '\u{275B}'
            | '\u{275C}'
            | '\u{FF07}'
    )
}

fn double_quote(c: char) -> bool {
    matches!(
        c,
        '\u{0022}'
            | '\u{02BA}'
            | '\u{02EE}'
            | '\u{201C}'..='\u{201F}'
            | '\u{2033}'
            | '\u{2036}'
            | '\u{275D}'
            | '\u{275E}'
            | '\u{276E}'
            | '\u{276F}'
            | '\u{301D}'..='\u{301F}'
            | '\u{FF02}'
    )
}

fn hyphen(c: char) -> bool {
    matches!(
        c,
        '\u{058A}'
            | '\u{05BE}'
            | '\u{1400}'
            | '\u{1806}'
            | '\u{2010}'
            | '\u{2011}'
            | '\u{2E17}'
            | '\u{2E1A}'
            | '\u{30A0}'
            | '\u{FE63}'
            | '\u{FF0D}'
    )
}

fn dash(c: char) -> bool {
    matches!(
        c,
        '\u{2012}'
            | '\u{2014}'
            | '\u{2015}'
            | '\u{2E3A}'
            | '\u{2E3B}'
            | '\u{2E40}'
            | '\u{301C}'
            | '\u{3030}'
            | '\u{FE31}'
            | '\u{FE32}'
            | '\u{FE58}'
    )
}

/// Control, format, private-use and noncharacter code points.
pub fn is_other(c: char) -> bool {
    if c.is_control() {
        return true;
    }
    let cp = c as u32;
    if cp & 0xFFFE == 0xFFFE || (0xFDD0..=0xFDEF).contains(&cp) {
        return true;
    }
    matches!(
        c,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{08E2}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{110BD}'
            | '\u{110CD}'
            | '\u{13430}'..='\u{1343F}'
            | '\u{1BCA0}'..='\u{1BCA3}'
            | '\u{1D173}'..='\u{1D17A}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
            | '\u{E000}'..='\u{F8FF}'
            | '\u{F0000}'..='\u{FFFFD}'
            | '\u{100000}'..='\u{10FFFD}'
    )
}

/// Normalize one attribute value. Tabs and line or paragraph separators
/// become spaces; other control characters are removed outright.
pub fn normalize_text(value: &str) -> String {
    let decoded = html_escape::decode_html_entities(value);
    let spaced: String = decoded
        .chars()
        .map(|c| if is_space_separator(c) { ' ' } else { c })
        .collect();

    spaced
        .nfkc()
        .filter_map(|c| match c {
            '\t' | '\u{2028}' | '\u{2029}' => Some(' '),
            ZERO_WIDTH_JOINER => Some(c),
            c if is_other(c) => None,
            c if single_quote(c) => Some('\''),
            c if double_quote(c) => Some('"'),
            c if hyphen(c) => Some('-'),
            c if dash(c) => Some('\u{2013}'),
            c => Some(c),
        })
        .collect()
}
