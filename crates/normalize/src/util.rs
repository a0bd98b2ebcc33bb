/// Levenshtein edit distance over chars, single working row.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { diag } else { diag + 1 };
            diag = row[j + 1];
            row[j + 1] = cost.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }

    row[b.len()]
}

/// Normalized similarity in [0.0, 1.0]: 1.0 for identical strings, 0.0 when
/// every character differs.
pub fn similarity(s1: &str, s2: &str) -> f32 {
    if s1 == s2 {
        return 1.0;
    }
    let max_len = s1.chars().count().max(s2.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f32 / max_len as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basic_edits() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("flaw", "lawn"), 2);
        assert_eq!(levenshtein_distance("sysco", "sysco"), 0);
    }

    #[test]
    fn distance_against_empty() {
        assert_eq!(levenshtein_distance("", "uline"), 5);
        assert_eq!(levenshtein_distance("uline", ""), 5);
    }

    #[test]
    fn distance_is_symmetric() {
        assert_eq!(
            levenshtein_distance("grainger", "granger"),
            levenshtein_distance("granger", "grainger")
        );
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("STAPLES", "STAPLES"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert!(similarity("ABC", "XYZ") <= 0.0 + f32::EPSILON);
    }

    #[test]
    fn similarity_close_names_are_high() {
        assert!(similarity("GRANGER", "GRAINGER") > 0.8);
        assert!(similarity("SISCO", "SYSCO") >= 0.75);
    }
}
