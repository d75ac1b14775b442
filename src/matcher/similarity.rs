//! String similarity scores on a 0-100 scale.

/// Indel similarity: `2 * LCS / (len(a) + len(b)) * 100`, over chars.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 100.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&a_chars, &b_chars);

    200.0 * lcs as f64 / (a_chars.len() + b_chars.len()) as f64
}

/// [`ratio`] after sorting whitespace-separated tokens, so word order
/// does not count.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Longest common subsequence length
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    let mut matrix = vec![vec![0usize; b_len + 1]; a_len + 1];

    for i in 1..=a_len {
        for j in 1..=b_len {
            matrix[i][j] = if a[i - 1] == b[j - 1] {
                matrix[i - 1][j - 1] + 1
            } else {
                matrix[i - 1][j].max(matrix[i][j - 1])
            };
        }
    }

    matrix[a_len][b_len]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_lcs_length() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(lcs_length(&chars("kitten"), &chars("sitting")), 4);
        assert_eq!(lcs_length(&chars("金克丝"), &chars("金克丝丝")), 3);
        assert_eq!(lcs_length(&chars(""), &chars("abc")), 0);
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio("卡莎", "卡莎"), 100.0);
        assert_eq!(ratio("", "卡莎"), 0.0);
        assert_eq!(ratio("", ""), 100.0);
        assert!(approx(ratio("abcd", "abce"), 75.0));
        assert!(approx(ratio("金克丝", "金克丝丝"), 85.71));
        assert!(approx(ratio("kitten", "sitting"), 61.54));
    }

    #[test]
    fn test_ratio_is_symmetric() {
        assert_eq!(ratio("暗影岛屿", "暗影岛"), ratio("暗影岛", "暗影岛屿"));
    }

    #[test]
    fn test_token_sort_ignores_word_order() {
        assert_eq!(token_sort_ratio("loose cannon jinx", "jinx  loose cannon"), 100.0);
        assert!(ratio("loose cannon jinx", "jinx loose cannon") < 100.0);
    }
}
