use sha2::{Digest, Sha256};
use veou_schema::Review;

/// Order-sensitive digest over the fields of a review set that affect the
/// generated summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReviewSetFingerprint([u8; 32]);

impl ReviewSetFingerprint {
    pub fn compute(reviews: &[Review]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((reviews.len() as u64).to_le_bytes());
        for review in reviews {
            // Length prefixes keep ("ab","c") and ("a","bc") apart.
            update_str(&mut hasher, &review.id);
            hasher.update([review.safety_rating, review.crowd_rating]);
            update_str(&mut hasher, review.time_of_day.as_str());
            update_str(&mut hasher, &review.text);
        }
        Self(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl std::fmt::Display for ReviewSetFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use veou_schema::TimeOfDay;

    fn review(id: &str, safety: u8, text: &str) -> Review {
        Review {
            id: id.into(),
            username: "tester".into(),
            time_of_day: TimeOfDay::Evening,
            safety_rating: safety,
            crowd_rating: 3,
            text: text.into(),
            helpful_count: 0,
        }
    }

    #[test]
    fn stable_for_unmodified_input() {
        let reviews = vec![review("1", 5, "calm"), review("2", 2, "sketchy")];
        assert_eq!(
            ReviewSetFingerprint::compute(&reviews),
            ReviewSetFingerprint::compute(&reviews)
        );
    }

    #[test]
    fn order_sensitive() {
        let a = review("1", 5, "calm");
        let b = review("2", 2, "sketchy");
        let forward = ReviewSetFingerprint::compute(&[a.clone(), b.clone()]);
        let reversed = ReviewSetFingerprint::compute(&[b, a]);
        assert_ne!(forward, reversed);
    }

    #[test]
    fn salient_fields_change_the_digest() {
        let base = review("1", 5, "calm");
        let fp = ReviewSetFingerprint::compute(std::slice::from_ref(&base));

        let mut changed = base.clone();
        changed.safety_rating = 4;
        assert_ne!(fp, ReviewSetFingerprint::compute(&[changed]));

        let mut changed = base.clone();
        changed.time_of_day = TimeOfDay::Night;
        assert_ne!(fp, ReviewSetFingerprint::compute(&[changed]));

        let mut changed = base.clone();
        changed.text.push('!');
        assert_ne!(fp, ReviewSetFingerprint::compute(&[changed]));
    }

    #[test]
    fn ignores_presentation_only_fields() {
        let base = review("1", 5, "calm");
        let mut other = base.clone();
        other.username = "someone else".into();
        other.helpful_count = 99;
        assert_eq!(
            ReviewSetFingerprint::compute(&[base]),
            ReviewSetFingerprint::compute(&[other])
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let a = ReviewSetFingerprint::compute(&[review("ab", 5, "c")]);
        let b = ReviewSetFingerprint::compute(&[review("a", 5, "bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_set_has_a_fingerprint() {
        let empty = ReviewSetFingerprint::compute(&[]);
        assert_eq!(empty, ReviewSetFingerprint::compute(&[]));
        assert_eq!(empty.to_hex().len(), 16);
    }
}
