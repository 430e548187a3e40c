use driftpatch::{
    chars_to_lines, cleanup_efficiency, cleanup_merge, cleanup_semantic,
    cleanup_semantic_lossless, common_overlap, common_prefix, common_suffix, diff,
    diff_with_cancel, levenshtein, lines_to_chars, source_text, target_text, transpose_position,
    Diff, DiffOptions,
};
use indoc::indoc;

fn options() -> DiffOptions {
    DiffOptions::default()
}

// --- Text utilities ---

#[test]
fn test_common_prefix() {
    // Null case.
    assert_eq!(common_prefix("abc", "xyz"), 0);
    // Non-null case.
    assert_eq!(common_prefix("1234abcdef", "1234xyz"), 4);
    // Whole case.
    assert_eq!(common_prefix("1234", "1234xyz"), 4);
    // Symmetry.
    assert_eq!(common_prefix("1234xyz", "1234"), 4);
    assert_eq!(common_prefix("", "abc"), 0);
}

#[test]
fn test_common_suffix() {
    assert_eq!(common_suffix("abc", "xyz"), 0);
    assert_eq!(common_suffix("abcdef1234", "xyz1234"), 4);
    assert_eq!(common_suffix("1234", "xyz1234"), 4);
    assert_eq!(common_suffix("xyz1234", "1234"), 4);
    assert_eq!(common_suffix("", ""), 0);
}

#[test]
fn test_common_overlap() {
    // Null case.
    assert_eq!(common_overlap("", "abcd"), 0);
    // Whole case.
    assert_eq!(common_overlap("abc", "abcd"), 3);
    // No overlap.
    assert_eq!(common_overlap("123456", "abcd"), 0);
    // Overlap.
    assert_eq!(common_overlap("123456xxx", "xxxabcd"), 3);
    // Entire pattern is a suffix of the first text.
    assert_eq!(common_overlap("fi", "i"), 1);
}

#[test]
fn test_lines_to_chars() {
    let encoded = lines_to_chars("alpha\nbeta\nalpha\n", "beta\nalpha\nbeta\n");
    assert_eq!(encoded.chars1, "\u{1}\u{2}\u{1}");
    assert_eq!(encoded.chars2, "\u{2}\u{1}\u{2}");
    assert_eq!(encoded.line_array, vec!["", "alpha\n", "beta\n"]);

    let encoded = lines_to_chars("", "alpha\r\nbeta\r\n\r\n\r\n");
    assert_eq!(encoded.chars1, "");
    assert_eq!(encoded.chars2, "\u{1}\u{2}\u{3}\u{3}");
    assert_eq!(encoded.line_array, vec!["", "alpha\r\n", "beta\r\n", "\r\n"]);

    // Missing trailing newline still counts as a line.
    let encoded = lines_to_chars("a", "b");
    assert_eq!(encoded.chars1, "\u{1}");
    assert_eq!(encoded.chars2, "\u{2}");
    assert_eq!(encoded.line_array, vec!["", "a", "b"]);
}

#[test]
fn test_lines_to_chars_many_lines() {
    // More lines than can be addressed by a single byte.
    let n = 300;
    let text: String = (1..=n).map(|i| format!("{}\n", i)).collect();
    let encoded = lines_to_chars(&text, "");
    assert_eq!(encoded.chars1.chars().count(), n);
    assert_eq!(encoded.line_array.len(), n + 1);

    let mut diffs = vec![Diff::delete(encoded.chars1.clone())];
    chars_to_lines(&mut diffs, &encoded.line_array);
    assert_eq!(diffs[0].text, text);
}

#[test]
fn test_lines_to_chars_cap() {
    // Past 40,000 distinct lines the remainder of text1 folds into one.
    let n = 41_000;
    let text: String = (1..=n).map(|i| format!("{}\n", i)).collect();
    let encoded = lines_to_chars(&text, "");
    assert_eq!(encoded.chars1.chars().count(), 40_000);

    let mut diffs = vec![Diff::equal(encoded.chars1.clone())];
    chars_to_lines(&mut diffs, &encoded.line_array);
    assert_eq!(diffs[0].text, text);
}

#[test]
fn test_chars_to_lines_roundtrip() {
    let encoded = lines_to_chars("alpha\nbeta\nalpha\n", "beta\nalpha\nbeta\n");
    let mut diffs = vec![
        Diff::equal(encoded.chars1.clone()),
        Diff::insert(encoded.chars2.clone()),
    ];
    chars_to_lines(&mut diffs, &encoded.line_array);
    assert_eq!(diffs[0].text, "alpha\nbeta\nalpha\n");
    assert_eq!(diffs[1].text, "beta\nalpha\nbeta\n");
}

// --- cleanup_merge ---

#[test]
fn test_cleanup_merge_null() {
    let mut diffs: Vec<Diff> = Vec::new();
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, Vec::new());
}

#[test]
fn test_cleanup_merge_no_change() {
    let mut diffs = vec![Diff::equal("a"), Diff::delete("b"), Diff::insert("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(
        diffs,
        vec![Diff::equal("a"), Diff::delete("b"), Diff::insert("c")]
    );
}

#[test]
fn test_cleanup_merge_equalities() {
    let mut diffs = vec![Diff::equal("a"), Diff::equal("b"), Diff::equal("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::equal("abc")]);
}

#[test]
fn test_cleanup_merge_deletions() {
    let mut diffs = vec![Diff::delete("a"), Diff::delete("b"), Diff::delete("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("abc")]);
}

#[test]
fn test_cleanup_merge_insertions() {
    let mut diffs = vec![Diff::insert("a"), Diff::insert("b"), Diff::insert("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::insert("abc")]);
}

#[test]
fn test_cleanup_merge_interweave() {
    let mut diffs = vec![
        Diff::delete("a"),
        Diff::insert("b"),
        Diff::delete("c"),
        Diff::insert("d"),
        Diff::equal("e"),
        Diff::equal("f"),
    ];
    cleanup_merge(&mut diffs);
    assert_eq!(
        diffs,
        vec![Diff::delete("ac"), Diff::insert("bd"), Diff::equal("ef")]
    );
}

#[test]
fn test_cleanup_merge_prefix_suffix_detection() {
    let mut diffs = vec![Diff::delete("a"), Diff::insert("abc"), Diff::delete("dc")];
    cleanup_merge(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("a"),
            Diff::delete("d"),
            Diff::insert("b"),
            Diff::equal("c"),
        ]
    );
}

#[test]
fn test_cleanup_merge_prefix_suffix_detection_with_equalities() {
    let mut diffs = vec![
        Diff::equal("x"),
        Diff::delete("a"),
        Diff::insert("abc"),
        Diff::delete("dc"),
        Diff::equal("y"),
    ];
    cleanup_merge(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("xa"),
            Diff::delete("d"),
            Diff::insert("b"),
            Diff::equal("cy"),
        ]
    );
}

#[test]
fn test_cleanup_merge_slide_edit_left() {
    let mut diffs = vec![Diff::equal("a"), Diff::insert("ba"), Diff::equal("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::insert("ab"), Diff::equal("ac")]);
}

#[test]
fn test_cleanup_merge_slide_edit_right() {
    let mut diffs = vec![Diff::equal("c"), Diff::insert("ab"), Diff::equal("a")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::equal("ca"), Diff::insert("ba")]);
}

#[test]
fn test_cleanup_merge_slide_edit_left_recursive() {
    let mut diffs = vec![
        Diff::equal("a"),
        Diff::delete("b"),
        Diff::equal("c"),
        Diff::delete("ac"),
        Diff::equal("x"),
    ];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("abc"), Diff::equal("acx")]);
}

#[test]
fn test_cleanup_merge_slide_edit_right_recursive() {
    let mut diffs = vec![
        Diff::equal("x"),
        Diff::delete("ca"),
        Diff::equal("c"),
        Diff::delete("b"),
        Diff::equal("a"),
    ];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::equal("xca"), Diff::delete("cba")]);
}

#[test]
fn test_cleanup_merge_empty_merge() {
    let mut diffs = vec![Diff::delete("b"), Diff::insert("ab"), Diff::equal("c")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::insert("a"), Diff::equal("bc")]);
}

#[test]
fn test_cleanup_merge_empty_equality() {
    let mut diffs = vec![Diff::equal(""), Diff::insert("a"), Diff::equal("b")];
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, vec![Diff::insert("a"), Diff::equal("b")]);
}

#[test]
fn test_cleanup_merge_is_idempotent() {
    let mut diffs = vec![Diff::delete("a"), Diff::insert("abc"), Diff::delete("dc")];
    cleanup_merge(&mut diffs);
    let once = diffs.clone();
    cleanup_merge(&mut diffs);
    assert_eq!(diffs, once);
}

// --- cleanup_semantic_lossless ---

#[test]
fn test_lossless_null() {
    let mut diffs: Vec<Diff> = Vec::new();
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(diffs, Vec::new());
}

#[test]
fn test_lossless_blank_lines() {
    let mut diffs = vec![
        Diff::equal("AAA\r\n\r\nBBB"),
        Diff::insert("\r\nDDD\r\n\r\nBBB"),
        Diff::equal("\r\nEEE"),
    ];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("AAA\r\n\r\n"),
            Diff::insert("BBB\r\nDDD\r\n\r\n"),
            Diff::equal("BBB\r\nEEE"),
        ]
    );
}

#[test]
fn test_lossless_line_boundaries() {
    let mut diffs = vec![
        Diff::equal("AAA\r\nBBB"),
        Diff::insert(" DDD\r\nBBB"),
        Diff::equal(" EEE"),
    ];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("AAA\r\n"),
            Diff::insert("BBB DDD\r\n"),
            Diff::equal("BBB EEE"),
        ]
    );
}

#[test]
fn test_lossless_word_boundaries() {
    let mut diffs = vec![
        Diff::equal("The c"),
        Diff::insert("ow and the c"),
        Diff::equal("at."),
    ];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("The "),
            Diff::insert("cow and the "),
            Diff::equal("cat."),
        ]
    );
}

#[test]
fn test_lossless_alphanumeric_boundaries() {
    let mut diffs = vec![
        Diff::equal("The-c"),
        Diff::insert("ow-and-the-c"),
        Diff::equal("at."),
    ];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("The-"),
            Diff::insert("cow-and-the-"),
            Diff::equal("cat."),
        ]
    );
}

#[test]
fn test_lossless_hitting_the_start() {
    let mut diffs = vec![Diff::equal("a"), Diff::delete("a"), Diff::equal("ax")];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("a"), Diff::equal("aax")]);
}

#[test]
fn test_lossless_hitting_the_end() {
    let mut diffs = vec![Diff::equal("xa"), Diff::delete("a"), Diff::equal("a")];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(diffs, vec![Diff::equal("xaa"), Diff::delete("a")]);
}

#[test]
fn test_lossless_sentence_boundaries() {
    let mut diffs = vec![
        Diff::equal("The xxx. The "),
        Diff::insert("zzz. The "),
        Diff::equal("yyy."),
    ];
    cleanup_semantic_lossless(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("The xxx."),
            Diff::insert(" The zzz."),
            Diff::equal(" The yyy."),
        ]
    );
}

// --- cleanup_semantic ---

#[test]
fn test_semantic_null() {
    let mut diffs: Vec<Diff> = Vec::new();
    cleanup_semantic(&mut diffs);
    assert_eq!(diffs, Vec::new());
}

#[test]
fn test_semantic_no_elimination_1() {
    let mut diffs = vec![
        Diff::delete("ab"),
        Diff::insert("cd"),
        Diff::equal("12"),
        Diff::delete("e"),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::delete("ab"),
            Diff::insert("cd"),
            Diff::equal("12"),
            Diff::delete("e"),
        ]
    );
}

#[test]
fn test_semantic_no_elimination_2() {
    let mut diffs = vec![
        Diff::delete("abc"),
        Diff::insert("ABC"),
        Diff::equal("1234"),
        Diff::delete("wxyz"),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::delete("abc"),
            Diff::insert("ABC"),
            Diff::equal("1234"),
            Diff::delete("wxyz"),
        ]
    );
}

#[test]
fn test_semantic_simple_elimination() {
    let mut diffs = vec![Diff::delete("a"), Diff::equal("b"), Diff::delete("c")];
    cleanup_semantic(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("abc"), Diff::insert("b")]);
}

#[test]
fn test_semantic_backpass_elimination() {
    let mut diffs = vec![
        Diff::delete("ab"),
        Diff::equal("cd"),
        Diff::delete("e"),
        Diff::equal("f"),
        Diff::insert("g"),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("abcdef"), Diff::insert("cdfg")]);
}

#[test]
fn test_semantic_multiple_eliminations() {
    let mut diffs = vec![
        Diff::insert("1"),
        Diff::equal("A"),
        Diff::delete("B"),
        Diff::insert("2"),
        Diff::equal("_"),
        Diff::insert("1"),
        Diff::equal("A"),
        Diff::delete("B"),
        Diff::insert("2"),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("AB_AB"), Diff::insert("1A2_1A2")]);
}

#[test]
fn test_semantic_word_boundaries() {
    let mut diffs = vec![
        Diff::equal("The c"),
        Diff::delete("ow and the c"),
        Diff::equal("at."),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("The "),
            Diff::delete("cow and the "),
            Diff::equal("cat."),
        ]
    );
}

#[test]
fn test_semantic_no_overlap_elimination() {
    let mut diffs = vec![Diff::delete("abcxx"), Diff::insert("xxdef")];
    cleanup_semantic(&mut diffs);
    assert_eq!(diffs, vec![Diff::delete("abcxx"), Diff::insert("xxdef")]);
}

#[test]
fn test_semantic_overlap_elimination() {
    let mut diffs = vec![Diff::delete("abcxxx"), Diff::insert("xxxdef")];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![Diff::delete("abc"), Diff::equal("xxx"), Diff::insert("def")]
    );
}

#[test]
fn test_semantic_reverse_overlap_elimination() {
    let mut diffs = vec![Diff::delete("xxxabc"), Diff::insert("defxxx")];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![Diff::insert("def"), Diff::equal("xxx"), Diff::delete("abc")]
    );
}

#[test]
fn test_semantic_two_overlap_eliminations() {
    let mut diffs = vec![
        Diff::delete("abcd1212"),
        Diff::insert("1212efghi"),
        Diff::equal("----"),
        Diff::delete("A3"),
        Diff::insert("3BC"),
    ];
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::delete("abcd"),
            Diff::equal("1212"),
            Diff::insert("efghi"),
            Diff::equal("----"),
            Diff::delete("A"),
            Diff::equal("3"),
            Diff::insert("BC"),
        ]
    );
}

// --- cleanup_efficiency ---

#[test]
fn test_efficiency_null() {
    let mut diffs: Vec<Diff> = Vec::new();
    cleanup_efficiency(&mut diffs, 4);
    assert_eq!(diffs, Vec::new());
}

#[test]
fn test_efficiency_no_elimination() {
    let mut diffs = vec![
        Diff::insert("ab"),
        Diff::delete("cd"),
        Diff::equal("12"),
        Diff::insert("34"),
    ];
    cleanup_efficiency(&mut diffs, 4);
    assert_eq!(
        diffs,
        vec![
            Diff::insert("ab"),
            Diff::delete("cd"),
            Diff::equal("12"),
            Diff::insert("34"),
        ]
    );
}

#[test]
fn test_efficiency_four_edit_elimination() {
    let mut diffs = vec![
        Diff::insert("ab"),
        Diff::delete("cd"),
        Diff::equal("12"),
        Diff::insert("34"),
        Diff::delete("56"),
    ];
    cleanup_efficiency(&mut diffs, 4);
    assert_eq!(diffs, vec![Diff::delete("cd1256"), Diff::insert("ab1234")]);
}

#[test]
fn test_efficiency_three_edit_elimination_high_cost() {
    // With a higher edit cost, a three-edit configuration collapses too.
    let mut diffs = vec![
        Diff::insert("ab"),
        Diff::delete("cd"),
        Diff::equal("12"),
        Diff::insert("34"),
    ];
    cleanup_efficiency(&mut diffs, 5);
    assert_eq!(diffs, vec![Diff::delete("cd12"), Diff::insert("ab1234")]);
}

// --- Diff helpers ---

#[test]
fn test_source_and_target_text() {
    let diffs = vec![
        Diff::equal("jump"),
        Diff::delete("s"),
        Diff::insert("ed"),
        Diff::equal(" over "),
        Diff::delete("the"),
        Diff::insert("a"),
        Diff::equal(" lazy"),
    ];
    assert_eq!(source_text(&diffs), "jumps over the lazy");
    assert_eq!(target_text(&diffs), "jumped over a lazy");
}

#[test]
fn test_transpose_position() {
    // Translation on equality.
    let diffs = vec![Diff::delete("a"), Diff::insert("1234"), Diff::equal("xyz")];
    assert_eq!(transpose_position(&diffs, 2), 5);
    // Translation on deletion.
    let diffs = vec![Diff::equal("a"), Diff::delete("1234"), Diff::equal("xyz")];
    assert_eq!(transpose_position(&diffs, 3), 1);
}

#[test]
fn test_levenshtein() {
    // Levenshtein with trailing equality.
    let diffs = vec![Diff::delete("abc"), Diff::insert("1234"), Diff::equal("xyz")];
    assert_eq!(levenshtein(&diffs), 4);
    // Levenshtein with leading equality.
    let diffs = vec![Diff::equal("xyz"), Diff::delete("abc"), Diff::insert("1234")];
    assert_eq!(levenshtein(&diffs), 4);
    // Levenshtein with middle equality.
    let diffs = vec![Diff::delete("abc"), Diff::equal("xyz"), Diff::insert("1234")];
    assert_eq!(levenshtein(&diffs), 7);
}

// --- diff ---

#[test]
fn test_diff_equality() {
    assert_eq!(diff("", "", &options()), Vec::new());
    assert_eq!(diff("abc", "abc", &options()), vec![Diff::equal("abc")]);
}

#[test]
fn test_diff_from_nothing() {
    assert_eq!(diff("", "abc", &options()), vec![Diff::insert("abc")]);
}

#[test]
fn test_diff_to_nothing() {
    assert_eq!(diff("abc", "", &options()), vec![Diff::delete("abc")]);
}

#[test]
fn test_diff_trailing_deletion() {
    assert_eq!(
        diff("abc", "ab", &options()),
        vec![Diff::equal("ab"), Diff::delete("c")]
    );
}

#[test]
fn test_diff_simple_insertion() {
    assert_eq!(
        diff("abc", "ab123c", &options()),
        vec![Diff::equal("ab"), Diff::insert("123"), Diff::equal("c")]
    );
}

#[test]
fn test_diff_simple_deletion() {
    assert_eq!(
        diff("a123bc", "abc", &options()),
        vec![Diff::equal("a"), Diff::delete("123"), Diff::equal("bc")]
    );
}

#[test]
fn test_diff_two_insertions() {
    assert_eq!(
        diff("abc", "a123b456c", &options()),
        vec![
            Diff::equal("a"),
            Diff::insert("123"),
            Diff::equal("b"),
            Diff::insert("456"),
            Diff::equal("c"),
        ]
    );
}

#[test]
fn test_diff_two_deletions() {
    assert_eq!(
        diff("a123b456c", "abc", &options()),
        vec![
            Diff::equal("a"),
            Diff::delete("123"),
            Diff::equal("b"),
            Diff::delete("456"),
            Diff::equal("c"),
        ]
    );
}

#[test]
fn test_diff_single_characters() {
    assert_eq!(
        diff("a", "b", &options()),
        vec![Diff::delete("a"), Diff::insert("b")]
    );
}

#[test]
fn test_diff_bisection() {
    assert_eq!(
        diff("cat", "map", &options()),
        vec![
            Diff::delete("c"),
            Diff::insert("m"),
            Diff::equal("a"),
            Diff::delete("t"),
            Diff::insert("p"),
        ]
    );
}

#[test]
fn test_diff_half_match() {
    assert_eq!(
        diff("1234567890", "a345678z", &options()),
        vec![
            Diff::delete("12"),
            Diff::insert("a"),
            Diff::equal("345678"),
            Diff::delete("90"),
            Diff::insert("z"),
        ]
    );
}

#[test]
fn test_diff_non_optimal_half_match() {
    // The half-match heuristic trades optimality for speed.
    assert_eq!(
        diff("qHilloHelloHew", "xHelloHeHulloy", &options()),
        vec![
            Diff::delete("qHillo"),
            Diff::insert("x"),
            Diff::equal("HelloHe"),
            Diff::delete("w"),
            Diff::insert("Hulloy"),
        ]
    );
}

#[test]
fn test_diff_sentence_pair() {
    let text1 = "The quick brown fox jumps over the lazy dog.";
    let text2 = "The quick brown fox jumped over a lazy dog.";
    let mut diffs = diff(text1, text2, &options());
    cleanup_semantic(&mut diffs);
    assert_eq!(
        diffs,
        vec![
            Diff::equal("The quick brown fox jump"),
            Diff::delete("s"),
            Diff::insert("ed"),
            Diff::equal(" over "),
            Diff::delete("the"),
            Diff::insert("a"),
            Diff::equal(" lazy dog."),
        ]
    );
}

#[test]
fn test_diff_rebuilds_inputs() {
    let pairs = [
        ("", "abc"),
        ("abc", ""),
        ("mouse", "sofas"),
        ("The quick brown fox.", "The quack brawn fax?"),
        ("a\nb\nc\n", "a\nd\nc\n"),
        ("héllo wörld", "hello world"),
        ("xxxabcxxx", "xxxdefxxx"),
    ];
    for (text1, text2) in pairs {
        let diffs = diff(text1, text2, &options());
        assert_eq!(source_text(&diffs), text1, "source for {:?}", (text1, text2));
        assert_eq!(target_text(&diffs), text2, "target for {:?}", (text1, text2));
    }
}

#[test]
fn test_diff_line_mode_matches_char_mode() {
    // Texts built from whole lines reduce identically with and without
    // the line-mode speedup.
    let text1 = "1234567890\n".repeat(13);
    let text2 = "abcdefghij\n".repeat(13);
    assert_eq!(
        diff(&text1, &text2, &options()),
        diff(&text1, &text2, &options().with_check_lines(false))
    );

    // Same, with no newlines at all.
    let text1 = "1234567890".repeat(13);
    let text2 = "abcdefghij".repeat(13);
    assert_eq!(
        diff(&text1, &text2, &options()),
        diff(&text1, &text2, &options().with_check_lines(false))
    );
}

#[test]
fn test_diff_line_mode_rebuilds_inputs() {
    let text1 = "1234567890\n".repeat(13);
    let text2 = indoc! {"
        abcdefghij
        1234567890
        1234567890
        1234567890
        abcdefghij
        1234567890
        1234567890
        1234567890
        abcdefghij
        1234567890
        1234567890
        1234567890
        abcdefghij
    "};
    let diffs = diff(&text1, text2, &options());
    assert_eq!(source_text(&diffs), text1);
    assert_eq!(target_text(&diffs), text2);
}

#[test]
fn test_diff_with_cancel_fallback() {
    // A callback that refuses immediately degrades the bisection to a
    // coarse delete/insert pair.
    let diffs = diff_with_cancel("abcy", "xxde", &options(), &|| false);
    assert_eq!(diffs, vec![Diff::delete("abcy"), Diff::insert("xxde")]);

    // The result is still a valid edit script.
    assert_eq!(source_text(&diffs), "abcy");
    assert_eq!(target_text(&diffs), "xxde");

    // A callback that always agrees changes nothing.
    assert_eq!(
        diff_with_cancel("abcy", "xxde", &options(), &|| true),
        diff("abcy", "xxde", &options())
    );
}

#[test]
fn test_diff_unicode() {
    // Multi-byte characters are treated as single units.
    let diffs = diff("🦀rust", "🦀crab", &options());
    assert_eq!(source_text(&diffs), "🦀rust");
    assert_eq!(target_text(&diffs), "🦀crab");
    assert_eq!(diffs[0], Diff::equal("🦀"));
}
