use proptest::prelude::*;
use rulewarden::ruletest::{join_output, TestOptions};
use rulewarden::types::{TestFormat, TestType};

fn chunk_strategy() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec("[a-z{}\":,0-9 ]{0,12}", 0..8)
}

fn options_strategy() -> impl Strategy<Value = TestOptions> {
    (
        proptest::option::of(0u32..400),
        prop_oneof![Just(TestFormat::Text), Just(TestFormat::Json)],
        0u64..1000,
        any::<bool>(),
        prop_oneof![
            Just(TestType::Full),
            Just(TestType::SchemaOnly),
            Just(TestType::CountOnly)
        ],
    )
        .prop_map(|(days, format, max_results, alert, test_type)| TestOptions {
            days,
            format,
            max_results,
            alert,
            test_type,
        })
}

proptest! {
    #[test]
    fn json_output_preserves_every_byte(chunks in chunk_strategy()) {
        let joined = join_output(&chunks, TestFormat::Json);
        prop_assert_eq!(joined.len(), chunks.iter().map(String::len).sum::<usize>());
        prop_assert_eq!(joined, chunks.concat());
    }

    #[test]
    fn text_output_splits_back_into_chunks(chunks in chunk_strategy()) {
        // Chunks without newlines, so the separator is unambiguous.
        prop_assume!(!chunks.is_empty());
        let joined = join_output(&chunks, TestFormat::Text);
        let split: Vec<&str> = joined.split('\n').collect();
        prop_assert_eq!(split, chunks.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn flags_follow_options(opts in options_strategy()) {
        let args = opts.to_args();
        let has = |flag: &str| args.iter().any(|a| a == flag);

        prop_assert_eq!(has("--days"), opts.days.is_some());
        prop_assert_eq!(has("--formatted-output"), opts.format == TestFormat::Json);
        prop_assert_eq!(has("--max-query-size"), opts.max_results > 0);
        prop_assert_eq!(has("--alert"), opts.alert);
        prop_assert_eq!(has("--schema-only"), opts.test_type == TestType::SchemaOnly);
        prop_assert_eq!(has("--count-only"), opts.test_type == TestType::CountOnly);
        prop_assert!(!(has("--schema-only") && has("--count-only")));
    }
}
