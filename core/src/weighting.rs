use serde::{Deserialize, Serialize};

/// tf-idf weighting options.
///
/// The defaults give the plain scheme `tf × ln(N / df)`. `sublinear_tf`
/// replaces `tf` with `1 + ln(tf)` and `smoothed_idf` replaces the idf with
/// `ln(1 + N / df)`, which keeps terms present in every document above zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weighting {
    pub sublinear_tf: bool,
    pub smoothed_idf: bool,
}

impl Weighting {
    pub fn tf(&self, raw: u32) -> f64 {
        if raw == 0 {
            0.0
        } else if self.sublinear_tf {
            1.0 + (raw as f64).ln()
        } else {
            raw as f64
        }
    }

    /// Inverse document frequency; zero when the term occurs nowhere.
    pub fn idf(&self, num_docs: u32, df: u32) -> f64 {
        if df == 0 || num_docs == 0 {
            return 0.0;
        }
        let ratio = num_docs as f64 / df as f64;
        if self.smoothed_idf {
            (1.0 + ratio).ln()
        } else {
            ratio.ln()
        }
    }

    pub fn tf_idf(&self, raw_tf: u32, num_docs: u32, df: u32) -> f64 {
        self.tf(raw_tf) * self.idf(num_docs, df)
    }
}

/// Binary Independence Model term weight.
///
/// With no relevance information `p` is fixed at 0.5 and `u` is estimated from
/// the collection as `(df + 0.5) / (N + 1)`, capped just below one.
pub fn bim_weight(num_docs: u32, df: u32) -> f64 {
    const P: f64 = 0.5;
    let mut u = (df as f64 + 0.5) / (num_docs as f64 + 1.0);
    if u >= 1.0 {
        u = 0.9999;
    }
    ((P * (1.0 - u)) / ((1.0 - P) * u)).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_tf_idf() {
        let w = Weighting::default();
        assert_eq!(w.tf_idf(2, 4, 2), 2.0 * 2f64.ln());
        assert_eq!(w.tf_idf(0, 4, 2), 0.0);
        assert_eq!(w.tf_idf(3, 4, 0), 0.0);
        // present in every document
        assert_eq!(w.tf_idf(3, 4, 4), 0.0);
    }

    #[test]
    fn smoothed_and_sublinear() {
        let w = Weighting { sublinear_tf: true, smoothed_idf: true };
        assert_eq!(w.tf(1), 1.0);
        assert!(w.idf(4, 4) > 0.0);
    }

    #[test]
    fn rare_terms_weigh_more_under_bim() {
        assert!(bim_weight(1000, 1) > bim_weight(1000, 100));
        assert!(bim_weight(3, 3).is_finite());
    }
}
