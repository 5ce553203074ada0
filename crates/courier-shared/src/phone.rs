//! Phone-number normalization.
//!
//! The directory keys contacts by their canonical national number: ten
//! digits with a single leading zero and no country code.  Everything read
//! from a device phone book is funnelled through [`DialPlan::normalize`]
//! before it touches storage; numbers that cannot be brought into canonical
//! form are dropped, never stored raw.

/// Rules for rewriting raw phone-book numbers into canonical national form.
#[derive(Debug, Clone)]
pub struct DialPlan {
    /// Country calling code without the `+`, e.g. `"94"`.
    pub country_code: &'static str,
    /// First digit of a national mobile number with its trunk zero missing,
    /// e.g. `'7'` for `712345678`.
    pub trunk_digit: char,
}

impl DialPlan {
    /// The Sri Lankan plan the directory service operates on.
    pub const LK: DialPlan = DialPlan {
        country_code: "94",
        trunk_digit: '7',
    };

    /// Normalize a raw phone-book number.
    ///
    /// Returns `None` for anything that does not end up as exactly ten
    /// digits starting with zero (short codes, landline fragments, foreign
    /// numbers).  Normalizing an already-canonical number returns it
    /// unchanged.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let mut num: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        // +94712345678 / 94712345678 -> 0712345678
        if num.len() == self.country_code.len() + 9 && num.starts_with(self.country_code) {
            num = format!("0{}", &num[self.country_code.len()..]);
        }

        // 712345678 -> 0712345678 (trunk zero missing)
        if num.len() == 9 && num.starts_with(self.trunk_digit) {
            num.insert(0, '0');
        }

        if num.len() == 10 && num.starts_with('0') {
            Some(num)
        } else {
            None
        }
    }
}

impl Default for DialPlan {
    fn default() -> Self {
        Self::LK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_country_code() {
        let plan = DialPlan::default();
        assert_eq!(plan.normalize("+94712345678").as_deref(), Some("0712345678"));
        assert_eq!(plan.normalize("94712345678").as_deref(), Some("0712345678"));
    }

    #[test]
    fn restores_missing_trunk_zero() {
        let plan = DialPlan::default();
        assert_eq!(plan.normalize("712345678").as_deref(), Some("0712345678"));
    }

    #[test]
    fn strips_formatting_characters() {
        let plan = DialPlan::default();
        assert_eq!(plan.normalize("+94 71 234-5678").as_deref(), Some("0712345678"));
        assert_eq!(plan.normalize("071 234 5678").as_deref(), Some("0712345678"));
    }

    #[test]
    fn rejects_invalid_numbers() {
        let plan = DialPlan::default();
        assert_eq!(plan.normalize("12345"), None);
        assert_eq!(plan.normalize(""), None);
        assert_eq!(plan.normalize("+4915712345678"), None);
        // Nine digits not starting with the trunk digit.
        assert_eq!(plan.normalize("812345678"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        let plan = DialPlan::default();
        for raw in ["+94712345678", "712345678", "0712345678", "071-234 5678"] {
            let once = plan.normalize(raw).expect("valid number");
            let twice = plan.normalize(&once).expect("still valid");
            assert_eq!(once, twice);
        }
    }
}
