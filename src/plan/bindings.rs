//! Pure binding enumeration
//!
//! Expands the iteration sources of a loop into one [`BindingSet`] per
//! iteration. Sources are zipped, so the loop is as long as its shortest source.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::expr::Value;
use crate::loop_spec::{IteratorSource, IteratorSpec, RangeSpec};

/// Values of every iteration variable for one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingSet {
    pub bindings: Vec<(String, Value)>,
}

impl BindingSet {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Pure: Number of values a range produces
pub fn range_len(range: &RangeSpec) -> usize {
    let (from, to, by) = (range.from as i128, range.to as i128, range.by as i128);
    let span = if by > 0 { to - from } else { from - to };
    if span <= 0 || by == 0 {
        return 0;
    }
    let steps = (span + by.abs() - 1) / by.abs();
    usize::try_from(steps).unwrap_or(usize::MAX)
}

fn source_len(source: &IteratorSource<'_>) -> usize {
    match source {
        IteratorSource::Values(values) => values.len(),
        IteratorSource::Range(range) => range_len(range),
    }
}

fn source_values(source: &IteratorSource<'_>, count: usize) -> Result<Vec<Value>> {
    match source {
        IteratorSource::Values(values) => values.iter().take(count).map(Value::from_json).collect(),
        IteratorSource::Range(range) => Ok((0..count)
            .map(|i| Value::Int((range.from as i128 + i as i128 * range.by as i128) as i64))
            .collect()),
    }
}

/// Pure: Number of iterations of a loop over `iterators`
pub fn iteration_count(iterators: &[IteratorSpec]) -> Result<usize> {
    let mut count: Option<usize> = None;
    for iterator in iterators {
        let len = source_len(&iterator.source()?);
        count = Some(count.map_or(len, |c| c.min(len)));
    }
    Ok(count.unwrap_or(0))
}

/// Pure: Enumerate the binding sets of a loop, in global iteration order
pub fn enumerate_bindings(iterators: &[IteratorSpec]) -> Result<Vec<BindingSet>> {
    let count = iteration_count(iterators)?;
    let columns = iterators
        .iter()
        .map(|it| Ok((it.name.as_str(), source_values(&it.source()?, count)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..count)
        .map(|i| BindingSet {
            bindings: columns
                .iter()
                .map(|(name, values)| (name.to_string(), values[i].clone()))
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zip_to_shortest() {
        let iterators = vec![
            IteratorSpec::values("name", vec![json!("a"), json!("b"), json!("c")]),
            IteratorSpec::range("i", 10, 12),
        ];
        let sets = enumerate_bindings(&iterators).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[1].get("name"), Some(&Value::Str("b".into())));
        assert_eq!(sets[1].get("i"), Some(&Value::Int(11)));
    }

    #[test]
    fn test_range_lengths() {
        let r = |from, to, by| RangeSpec { from, to, by };
        assert_eq!(range_len(&r(0, 10, 1)), 10);
        assert_eq!(range_len(&r(0, 10, 3)), 4);
        assert_eq!(range_len(&r(10, 0, -2)), 5);
        assert_eq!(range_len(&r(5, 5, 1)), 0);
        assert_eq!(range_len(&r(5, 0, 1)), 0);
    }

    #[test]
    fn test_descending_range_values() {
        let iterators = vec![IteratorSpec {
            name: "i".to_string(),
            values: None,
            range: Some(RangeSpec { from: 3, to: 0, by: -1 }),
        }];
        let values: Vec<_> = enumerate_bindings(&iterators)
            .unwrap()
            .into_iter()
            .map(|s| s.bindings[0].1.clone())
            .collect();
        assert_eq!(values, vec![Value::Int(3), Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_empty_source_yields_empty_loop() {
        let iterators = vec![
            IteratorSpec::values("x", vec![]),
            IteratorSpec::range("i", 0, 100),
        ];
        assert!(enumerate_bindings(&iterators).unwrap().is_empty());
    }
}
