// Free-text cleanup applied to postings before they are returned or stored as progress.

use unicode_normalization::UnicodeNormalization;

use crate::models::job::{truncate_chars, JobPosting};

const MAX_TEXT_CHARS: usize = 1000;

/// Reduces `text` to single-line printable ASCII. Accented letters fold to
/// their base letter (NFKD) and other non-ASCII is dropped; `"` becomes `'`,
/// `\` becomes `/`, whitespace runs collapse to one space, and the result is
/// capped at 1000 chars.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.nfkd().filter(char::is_ascii) {
        match c {
            c if c.is_ascii_whitespace() => pending_space = true,
            c if c.is_ascii_control() => {}
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(match c {
                    '"' => '\'',
                    '\\' => '/',
                    other => other,
                });
            }
        }
    }

    truncate_chars(&out, MAX_TEXT_CHARS)
}

fn sanitize_field(field: &mut Option<String>) {
    if let Some(value) = field.as_mut() {
        *value = sanitize_text(value);
    }
}

pub fn sanitize_posting(job: &mut JobPosting) {
    sanitize_field(&mut job.title);
    sanitize_field(&mut job.company);
    sanitize_field(&mut job.location);
    sanitize_field(&mut job.description);

    let analysis = &mut job.analysis;
    analysis.similarity_explanation = sanitize_text(&analysis.similarity_explanation);
    for item in analysis
        .key_matches
        .iter_mut()
        .chain(analysis.missing_requirements.iter_mut())
    {
        *item = sanitize_text(item);
    }
}
