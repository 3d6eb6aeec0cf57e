//! Grid sectioning.
//!
//! The wall splits its ordered instances into `sections` contiguous groups.
//! With `base = total / sections` and `extra = total % sections`, the first
//! `extra` sections hold `base + 1` instances and the rest hold `base`.

use std::ops::Range;

use multiwall_common::error::{WallError, WallResult};

/// A contiguous slice of registry positions.
pub type GridSection = Range<usize>;

fn check_sections(sections: usize) -> WallResult<()> {
    if sections == 0 {
        return Err(WallError::contract("grid needs at least one section"));
    }
    Ok(())
}

/// Split `0..total` into `sections` ordered, contiguous, disjoint ranges.
pub fn partition(total: usize, sections: usize) -> WallResult<Vec<GridSection>> {
    check_sections(sections)?;
    let base = total / sections;
    let extra = total % sections;

    let mut start = 0;
    let ranges = (0..sections)
        .map(|section| {
            let len = if section < extra { base + 1 } else { base };
            let range = start..start + len;
            start += len;
            range
        })
        .collect();
    Ok(ranges)
}

/// Size of the largest section: `ceil(total / sections)`.
pub fn max_items_per_section(total: usize, sections: usize) -> WallResult<usize> {
    check_sections(sections)?;
    Ok(total.div_ceil(sections))
}

/// Registry position of `slot` within `section`, if that cell is occupied.
pub fn cell_index(
    total: usize,
    sections: usize,
    section: usize,
    slot: usize,
) -> WallResult<Option<usize>> {
    let ranges = partition(total, sections)?;
    Ok(ranges.get(section).and_then(|range| {
        let index = range.start + slot;
        range.contains(&index).then_some(index)
    }))
}

/// `(section, slot)` holding registry position `index`.
pub fn locate(total: usize, sections: usize, index: usize) -> WallResult<Option<(usize, usize)>> {
    let ranges = partition(total, sections)?;
    Ok(ranges
        .iter()
        .enumerate()
        .find(|(_, range)| range.contains(&index))
        .map(|(section, range)| (section, index - range.start)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extra_goes_to_first_sections() {
        assert_eq!(partition(10, 3).unwrap(), vec![0..4, 4..7, 7..10]);
        assert_eq!(max_items_per_section(10, 3).unwrap(), 4);
    }

    #[test]
    fn test_more_sections_than_items() {
        assert_eq!(partition(2, 4).unwrap(), vec![0..1, 1..2, 2..2, 2..2]);
        assert_eq!(partition(0, 2).unwrap(), vec![0..0, 0..0]);
        assert_eq!(max_items_per_section(0, 2).unwrap(), 0);
    }

    #[test]
    fn test_zero_sections_is_contract_violation() {
        assert!(matches!(
            partition(5, 0),
            Err(WallError::InputContractViolation { .. })
        ));
        assert!(max_items_per_section(5, 0).is_err());
    }

    #[test]
    fn test_cell_lookup() {
        // 0..4, 4..7, 7..10
        assert_eq!(cell_index(10, 3, 1, 2).unwrap(), Some(6));
        assert_eq!(cell_index(10, 3, 1, 3).unwrap(), None);
        assert_eq!(cell_index(10, 3, 5, 0).unwrap(), None);
        assert_eq!(locate(10, 3, 7).unwrap(), Some((2, 0)));
        assert_eq!(locate(10, 3, 10).unwrap(), None);
    }

    proptest! {
        #[test]
        fn test_partition_covers_exactly(total in 0usize..500, sections in 1usize..40) {
            let ranges = partition(total, sections).unwrap();
            prop_assert_eq!(ranges.len(), sections);

            let mut expected_start = 0;
            for range in &ranges {
                prop_assert_eq!(range.start, expected_start);
                prop_assert!(range.end >= range.start);
                expected_start = range.end;
            }
            prop_assert_eq!(expected_start, total);

            let sizes: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
            let max = *sizes.iter().max().unwrap();
            let min = *sizes.iter().min().unwrap();
            prop_assert!(max - min <= 1);
            prop_assert_eq!(max, max_items_per_section(total, sections).unwrap());

            let extra = total % sections;
            for (i, size) in sizes.iter().enumerate() {
                let expected = total / sections + usize::from(i < extra);
                prop_assert_eq!(*size, expected);
            }
        }

        #[test]
        fn test_locate_inverts_cell_index(total in 1usize..200, sections in 1usize..20, pick in 0usize..200) {
            let index = pick % total;
            let (section, slot) = locate(total, sections, index).unwrap().unwrap();
            prop_assert_eq!(cell_index(total, sections, section, slot).unwrap(), Some(index));
        }
    }
}
