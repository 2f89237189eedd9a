//! Property-based tests for planning, capture and accumulation

#[cfg(test)]
mod tests {
    use crate::accumulate::Accumulator;
    use crate::capture::{CallerScope, ScopeCapture};
    use crate::expr::{parse_expression, Value};
    use crate::loop_spec::{BuiltinCombine, CombinePolicy, IteratorSpec, LoopSpec};
    use crate::packages::PackageRegistry;
    use crate::plan::{chunk_count, plan_chunks, ChunkRange};
    use proptest::prelude::*;
    use std::num::NonZeroUsize;
    use std::sync::Arc;

    fn fold_all(spec: LoopSpec, chunks: &[ChunkRange], order: &[usize]) -> Value {
        let total = chunks.last().map_or(0, |c| c.end);
        let prepared = spec.prepare().expect("valid loop");
        let mut acc = Accumulator::new(total, &prepared, Arc::new(PackageRegistry::standard())).expect("accumulator");
        for &i in order {
            let chunk = chunks[i];
            let values = chunk.indices().map(|i| Value::Int(i as i64 * 7 % 11)).collect();
            acc.fold(chunk, values).expect("fold");
        }
        acc.result().expect("complete")
    }

    fn shuffled(len: usize, seed: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..len).collect();
        let mut state = seed | 1;
        for i in (1..len).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            order.swap(i, (state % (i as u64 + 1)) as usize);
        }
        order
    }

    // Property test: chunks partition [0, N) exactly
    proptest! {
        #[test]
        fn test_chunks_partition_the_range(total in 0usize..500, size in 1usize..64) {
            let chunk_size = NonZeroUsize::new(size).unwrap();
            let chunks: Vec<_> = plan_chunks(total, chunk_size).collect();

            prop_assert_eq!(chunks.len(), chunk_count(total, chunk_size));
            prop_assert_eq!(chunks.len(), total.div_ceil(size));

            let mut next = 0;
            for (index, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, index);
                prop_assert_eq!(chunk.start, next);
                prop_assert!(!chunk.is_empty());
                prop_assert!(chunk.len() <= size);
                next = chunk.end;
            }
            prop_assert_eq!(next, total);
        }
    }

    // Property test: completion order never changes an ordered fold
    proptest! {
        #[test]
        fn test_fold_order_independence(total in 1usize..60, size in 1usize..8, seed in any::<u64>()) {
            let chunks: Vec<_> = plan_chunks(total, NonZeroUsize::new(size).unwrap()).collect();
            let in_order: Vec<usize> = (0..chunks.len()).collect();
            let shuffled = shuffled(chunks.len(), seed);
            let spec = || LoopSpec::new(vec![IteratorSpec::range("i", 0, total as i64)], "i");

            let policies = [
                CombinePolicy::Collect,
                CombinePolicy::Builtin(BuiltinCombine::Sum),
                CombinePolicy::Builtin(BuiltinCombine::Append),
                CombinePolicy::Function("fn(acc, x) { (acc * 3 + x) % 1000003 }".to_string()),
            ];
            for policy in policies {
                let expected = fold_all(spec().with_combine(policy.clone()), &chunks, &in_order);
                let actual = fold_all(spec().with_combine(policy), &chunks, &shuffled);
                prop_assert_eq!(actual, expected);
            }
        }
    }

    // Property test: loop variables and no-export names are never captured
    proptest! {
        #[test]
        fn test_capture_excludes_loop_variables(
            names in prop::collection::btree_set("[a-e]{1,2}", 1..6),
            excluded in prop::collection::btree_set("[a-e]{1,2}", 0..4),
        ) {
            let registry = PackageRegistry::standard();
            let mut caller = CallerScope::new(&registry).unwrap();
            for name in names.iter().chain(excluded.iter()) {
                caller.define(name.clone(), Value::Int(1));
            }
            let source = names.iter().chain(excluded.iter()).cloned().collect::<Vec<_>>().join(" + ");
            let expr = parse_expression(&source).unwrap();

            let loop_variables: Vec<String> = names.iter().take(1).cloned().collect();
            let no_export: Vec<String> = excluded.iter().cloned().collect();
            let scope = ScopeCapture::new(&caller, &registry)
                .loop_variables(&loop_variables)
                .no_export(&no_export)
                .capture(&expr);

            if let Ok(scope) = scope {
                for name in scope.names() {
                    prop_assert!(!loop_variables.contains(name));
                    prop_assert!(!no_export.contains(name));
                }
            }
        }
    }
}
