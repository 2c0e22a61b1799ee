//! Bit-pattern matcher
//!
//! Each rule compiles to a 9-bit `(mask, value)` pair: bit *i* is in `mask`
//! when the rule constrains classification bit *i*, and set in `value` when
//! that constraint is `true`. The input vector is scanned as overlapping
//! 9-bit windows; the first `(offset, rule)` pair with
//! `window & mask == value` wins, offsets outer and rules inner.

use pulse_model::{PatternMapping, CLASSIFICATION_BITS};

use crate::error::{Result, RuleError};

/// Compiled form of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMask {
    pub mask: u16,
    pub value: u16,
}

impl RuleMask {
    pub fn compile(mapping: &PatternMapping) -> Self {
        let mut mask = 0u16;
        let mut value = 0u16;
        for (i, bit) in mapping.classification_bits().iter().enumerate() {
            if let Some(expected) = bit {
                mask |= 1 << i;
                if *expected {
                    value |= 1 << i;
                }
            }
        }
        Self { mask, value }
    }

    #[inline]
    pub fn matches(&self, window: u16) -> bool {
        window & self.mask == self.value
    }
}

/// Pack `inputs[start..start + 9]` into a window, line `start + i` at bit *i*
#[inline]
pub fn window_at(inputs: &[bool], start: usize) -> u16 {
    inputs[start..start + CLASSIFICATION_BITS]
        .iter()
        .enumerate()
        .fold(0u16, |acc, (i, on)| if *on { acc | (1 << i) } else { acc })
}

fn check_len(inputs: &[bool]) -> Result<()> {
    if inputs.len() < CLASSIFICATION_BITS {
        return Err(RuleError::InvalidArgument(format!(
            "input vector must have at least {} values, got {}",
            CLASSIFICATION_BITS,
            inputs.len()
        )));
    }
    Ok(())
}

/// Match once against an uncompiled rule table
pub fn match_pattern<'a>(
    inputs: &[bool],
    rules: &'a [PatternMapping],
) -> Result<Option<&'a PatternMapping>> {
    CompiledRules::compile(rules).match_inputs(inputs).map(|hit| hit.map(|idx| &rules[idx]))
}

/// A rule table with masks precomputed, in table order
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    masks: Vec<RuleMask>,
}

impl CompiledRules {
    pub fn compile(rules: &[PatternMapping]) -> Self {
        Self {
            masks: rules.iter().map(RuleMask::compile).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Index (into the compiled table) of the winning rule
    pub fn match_inputs(&self, inputs: &[bool]) -> Result<Option<usize>> {
        check_len(inputs)?;
        if self.masks.is_empty() {
            return Ok(None);
        }

        for start in 0..=inputs.len() - CLASSIFICATION_BITS {
            let window = window_at(inputs, start);
            if let Some(idx) = self.masks.iter().position(|m| m.matches(window)) {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn rule(id: i64, bits: [Option<bool>; 9]) -> PatternMapping {
        PatternMapping::new(id, bits, [false, false, false])
    }

    fn bits_from(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    const ANY: Option<bool> = None;
    const ON: Option<bool> = Some(true);
    const OFF: Option<bool> = Some(false);

    #[test]
    fn test_compile_mask() {
        let m = RuleMask::compile(&rule(1, [ON, ANY, OFF, ANY, ANY, ANY, ANY, ANY, ON]));
        assert_eq!(m.mask, 0b1_0000_0101);
        assert_eq!(m.value, 0b1_0000_0001);
    }

    #[test]
    fn test_window_bit_order() {
        let inputs = bits_from("1100000001");
        assert_eq!(window_at(&inputs, 0), 0b0_0000_0011);
        assert_eq!(window_at(&inputs, 1), 0b1_0000_0001);
    }

    #[test]
    fn test_too_few_inputs_is_invalid_argument() {
        let rules = vec![rule(1, [ANY; 9])];
        for len in 0..9 {
            let err = match_pattern(&vec![true; len], &rules).unwrap_err();
            assert!(matches!(err, RuleError::InvalidArgument(_)));
        }
        // Even with an empty table the contract check comes first
        assert!(match_pattern(&[true; 8], &[]).is_err());
    }

    #[test]
    fn test_empty_table_never_matches() {
        assert_eq!(match_pattern(&[true; 9], &[]).unwrap(), None);
        assert_eq!(match_pattern(&[false; 16], &[]).unwrap(), None);
    }

    #[test]
    fn test_first_rule_in_table_order_wins_at_same_offset() {
        let rules = vec![
            rule(1, [ON, ANY, ANY, ANY, ANY, ANY, ANY, ANY, ANY]),
            rule(2, [ON, ON, ANY, ANY, ANY, ANY, ANY, ANY, ANY]),
        ];
        let hit = match_pattern(&bits_from("110000000"), &rules).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(1));
    }

    #[test]
    fn test_lower_offset_beats_lower_table_index() {
        // Rule 1 only matches at offset 1, rule 2 matches at offset 0
        let rules = vec![
            rule(1, [ON, ON, ON, ANY, ANY, ANY, ANY, ANY, ANY]),
            rule(2, [OFF, ON, ANY, ANY, ANY, ANY, ANY, ANY, ANY]),
        ];
        let inputs = bits_from("0111000000");
        let hit = match_pattern(&inputs, &rules).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(2));
    }

    #[test]
    fn test_match_found_in_later_window() {
        let rules = vec![rule(5, [ON, ON, ON, ON, ON, ON, ON, ON, ON])];
        let mut inputs = vec![false; 16];
        for line in inputs.iter_mut().skip(7) {
            *line = true;
        }
        let hit = match_pattern(&inputs, &rules).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(5));

        inputs[7] = false;
        assert_eq!(match_pattern(&inputs, &rules).unwrap(), None);
    }

    #[test]
    fn test_catch_all_matches_anything() {
        let rules = vec![
            rule(1, [ON, ON, ON, ON, ON, ON, ON, ON, ON]),
            rule(99, [ANY; 9]),
        ];
        let hit = match_pattern(&[false; 12], &rules).unwrap();
        assert_eq!(hit.map(|r| r.id), Some(99));
    }

    #[test]
    fn test_never_errors_for_valid_lengths() {
        let rules = vec![rule(1, [OFF, ON, OFF, ON, OFF, ON, OFF, ON, OFF])];
        for len in 9..24 {
            for seed in 0..64u32 {
                let inputs: Vec<bool> = (0..len).map(|i| (seed >> (i % 6)) & 1 == 1).collect();
                assert!(match_pattern(&inputs, &rules).is_ok());
            }
        }
    }
}
