//! Three-way merge of one file: baseline, local copy, new template.
//!
//! Text is merged line by line (diff3 over two LCS alignments against the
//! baseline). Binary or oversized inputs are only merged when one side left
//! the baseline untouched.

/// Largest LCS table (cells) attempted after trimming common prefix/suffix.
const MAX_LCS_CELLS: usize = 4_000_000;

/// Overlapping local and template edits of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictHunk {
    /// Baseline lines of the region.
    pub base: Vec<String>,
    /// Local lines of the region.
    pub ours: Vec<String>,
    /// Template lines of the region.
    pub theirs: Vec<String>,
}

impl ConflictHunk {
    fn whole(base: Option<&[u8]>, ours: Option<&[u8]>, theirs: Option<&[u8]>) -> Self {
        let describe = |side: Option<&[u8]>| match side {
            None => vec!["<deleted>\n".to_string()],
            Some(bytes) => std::str::from_utf8(bytes)
                .ok()
                .filter(|text| !text.contains('\0'))
                .map_or_else(
                    || vec![format!("<binary, {} bytes>\n", bytes.len())],
                    |text| split_lines(text).into_iter().map(String::from).collect(),
                ),
        };
        Self {
            base: describe(base),
            ours: describe(ours),
            theirs: describe(theirs),
        }
    }

    /// Render the hunk with diff3-style conflict markers.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut section = |marker: &str, lines: &[String]| {
            out.push_str(marker);
            out.push('\n');
            for line in lines {
                out.push_str(line);
                if !line.ends_with('\n') {
                    out.push('\n');
                }
            }
        };
        section("<<<<<<< local", &self.ours);
        section("||||||| base", &self.base);
        section("=======", &self.theirs);
        out.push_str(">>>>>>> template\n");
        out
    }
}

/// Result of merging one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merged content; `None` means the file should not exist.
    Applied(Option<Vec<u8>>),
    /// Edits overlap and need manual resolution.
    Conflicted(Vec<ConflictHunk>),
}

/// Merge the template change `base -> theirs` into the local copy `ours`.
///
/// `None` stands for an absent file on that side.
#[must_use]
pub fn merge_file(base: Option<&[u8]>, ours: Option<&[u8]>, theirs: Option<&[u8]>) -> MergeOutcome {
    if ours == theirs || base == theirs {
        return MergeOutcome::Applied(ours.map(<[u8]>::to_vec));
    }
    if base == ours {
        return MergeOutcome::Applied(theirs.map(<[u8]>::to_vec));
    }

    // Both sides changed. A deletion against a modification cannot be merged.
    let (Some(ours_bytes), Some(theirs_bytes)) = (ours, theirs) else {
        return MergeOutcome::Conflicted(vec![ConflictHunk::whole(base, ours, theirs)]);
    };
    let base_bytes = base.unwrap_or_default();

    let (Some(base_text), Some(ours_text), Some(theirs_text)) =
        (as_text(base_bytes), as_text(ours_bytes), as_text(theirs_bytes))
    else {
        return MergeOutcome::Conflicted(vec![ConflictHunk::whole(base, ours, theirs)]);
    };

    let base_lines = split_lines(base_text);
    let ours_lines = split_lines(ours_text);
    let theirs_lines = split_lines(theirs_text);

    match merge_lines(&base_lines, &ours_lines, &theirs_lines) {
        Some(Ok(merged)) => MergeOutcome::Applied(Some(merged.into_bytes())),
        Some(Err(hunks)) => MergeOutcome::Conflicted(hunks),
        None => MergeOutcome::Conflicted(vec![ConflictHunk::whole(base, ours, theirs)]),
    }
}

fn as_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes)
        .ok()
        .filter(|text| !text.contains('\0'))
}

/// Split into lines, keeping terminators so joining restores the input.
fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// A replaced range: `base[base_start..base_end]` became
/// `other[other_start..other_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hunk {
    base_start: usize,
    base_end: usize,
    other_start: usize,
    other_end: usize,
}

/// Changed ranges between `base` and `other`, in order. `None` when the
/// inputs are too large to align.
// Indices stay within the slice lengths checked by the loop bounds.
#[allow(clippy::indexing_slicing)]
fn diff_hunks(base: &[&str], other: &[&str]) -> Option<Vec<Hunk>> {
    let prefix = base
        .iter()
        .zip(other)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(other[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &base[prefix..base.len() - suffix];
    let b = &other[prefix..other.len() - suffix];
    if a.len().saturating_mul(b.len()) > MAX_LCS_CELLS {
        return None;
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..], stored row-major.
    let width = b.len() + 1;
    let mut lcs = vec![0u32; (a.len() + 1) * width];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut hunks = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (mut start_i, mut start_j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            if start_i < i || start_j < j {
                hunks.push(Hunk {
                    base_start: prefix + start_i,
                    base_end: prefix + i,
                    other_start: prefix + start_j,
                    other_end: prefix + j,
                });
            }
            i += 1;
            j += 1;
            start_i = i;
            start_j = j;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    if start_i < a.len() || start_j < b.len() {
        hunks.push(Hunk {
            base_start: prefix + start_i,
            base_end: prefix + a.len(),
            other_start: prefix + start_j,
            other_end: prefix + b.len(),
        });
    }
    Some(hunks)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Ours,
    Theirs,
}

/// Lines of `other` covering `base[start..end]`, given the side's hunks that
/// fall inside that region. Outside its hunks a side equals the baseline.
#[allow(clippy::indexing_slicing)]
fn side_region<'a>(
    base: &[&'a str],
    other: &[&'a str],
    hunks: &[Hunk],
    start: usize,
    end: usize,
) -> Vec<&'a str> {
    match (hunks.first(), hunks.last()) {
        (Some(first), Some(last)) => {
            let from = first.other_start - (first.base_start - start);
            let to = last.other_end + (end - last.base_end);
            other[from..to].to_vec()
        }
        _ => base[start..end].to_vec(),
    }
}

/// diff3 over lines: `Ok(merged)`, `Err(conflicts)`, or `None` when the
/// inputs are too large to align.
#[allow(clippy::indexing_slicing)]
fn merge_lines(
    base: &[&str],
    ours: &[&str],
    theirs: &[&str],
) -> Option<Result<String, Vec<ConflictHunk>>> {
    let mut tagged: Vec<(Side, Hunk)> = diff_hunks(base, ours)?
        .into_iter()
        .map(|h| (Side::Ours, h))
        .chain(
            diff_hunks(base, theirs)?
                .into_iter()
                .map(|h| (Side::Theirs, h)),
        )
        .collect();
    tagged.sort_by_key(|(_, h)| (h.base_start, h.base_end));

    let mut merged = String::new();
    let mut conflicts = Vec::new();
    let mut base_pos = 0;
    let mut idx = 0;

    while idx < tagged.len() {
        let (_, first) = tagged[idx];
        let region_start = first.base_start;
        let mut region_end = first.base_end;
        let mut next = idx + 1;
        while next < tagged.len() && tagged[next].1.base_start <= region_end {
            region_end = region_end.max(tagged[next].1.base_end);
            next += 1;
        }

        let region = &tagged[idx..next];
        let side_hunks = |side: Side| -> Vec<Hunk> {
            region
                .iter()
                .filter(|(s, _)| *s == side)
                .map(|(_, h)| *h)
                .collect()
        };
        let ours_hunks = side_hunks(Side::Ours);
        let theirs_hunks = side_hunks(Side::Theirs);

        merged.extend(base[base_pos..region_start].iter().copied());

        let ours_lines = side_region(base, ours, &ours_hunks, region_start, region_end);
        let theirs_lines = side_region(base, theirs, &theirs_hunks, region_start, region_end);

        if theirs_hunks.is_empty() || ours_lines == theirs_lines {
            merged.extend(ours_lines);
        } else if ours_hunks.is_empty() {
            merged.extend(theirs_lines);
        } else {
            let owned = |lines: &[&str]| lines.iter().map(|l| (*l).to_string()).collect();
            conflicts.push(ConflictHunk {
                base: owned(&base[region_start..region_end]),
                ours: owned(&ours_lines),
                theirs: owned(&theirs_lines),
            });
        }

        base_pos = region_end;
        idx = next;
    }
    merged.extend(base[base_pos..].iter().copied());

    Some(if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(conflicts)
    })
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn merged(base: &str, ours: &str, theirs: &str) -> String {
        match merge_file(
            Some(base.as_bytes()),
            Some(ours.as_bytes()),
            Some(theirs.as_bytes()),
        ) {
            MergeOutcome::Applied(Some(bytes)) => String::from_utf8(bytes).unwrap(),
            other => panic!("expected clean merge, got {other:?}"),
        }
    }

    fn conflicts(base: &str, ours: &str, theirs: &str) -> Vec<ConflictHunk> {
        match merge_file(
            Some(base.as_bytes()),
            Some(ours.as_bytes()),
            Some(theirs.as_bytes()),
        ) {
            MergeOutcome::Conflicted(hunks) => hunks,
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_local_takes_template() {
        assert_eq!(merged("a\nb\n", "a\nb\n", "a\nc\n"), "a\nc\n");
    }

    #[test]
    fn unchanged_template_keeps_local() {
        assert_eq!(merged("a\nb\n", "a\nlocal\n", "a\nb\n"), "a\nlocal\n");
    }

    #[test]
    fn disjoint_edits_are_combined() {
        let base = "alias ll='ls -l'\nexport EDITOR=vi\nexport PAGER=less\nsetopt autocd\n";
        let ours = "alias ll='ls -la'\nexport EDITOR=vi\nexport PAGER=less\nsetopt autocd\n";
        let theirs = "alias ll='ls -l'\nexport EDITOR=vi\nexport PAGER=less\nsetopt autocd extendedglob\n";
        assert_eq!(
            merged(base, ours, theirs),
            "alias ll='ls -la'\nexport EDITOR=vi\nexport PAGER=less\nsetopt autocd extendedglob\n"
        );
    }

    #[test]
    fn insertions_at_both_ends_are_combined() {
        assert_eq!(
            merged("m\n", "top\nm\n", "m\nbottom\n"),
            "top\nm\nbottom\n"
        );
    }

    #[test]
    fn identical_edits_merge_cleanly() {
        assert_eq!(merged("a\nb\nc\n", "a\nX\nc\n", "a\nX\nc\n"), "a\nX\nc\n");
    }

    #[test]
    fn overlapping_edits_conflict() {
        let hunks = conflicts("a\nb\nc\n", "a\nlocal\nc\n", "a\nupstream\nc\n");
        assert_eq!(
            hunks,
            vec![ConflictHunk {
                base: vec!["b\n".to_string()],
                ours: vec!["local\n".to_string()],
                theirs: vec!["upstream\n".to_string()],
            }]
        );
    }

    #[test]
    fn conflict_renders_markers() {
        let hunks = conflicts("a\nb\nc\n", "a\nlocal\nc\n", "a\nupstream\nc\n");
        insta::assert_snapshot!(hunks[0].render(), @r"
        <<<<<<< local
        local
        ||||||| base
        b
        =======
        upstream
        >>>>>>> template
        ");
    }

    #[test]
    fn deletion_by_template_applies_when_local_untouched() {
        assert_eq!(
            merge_file(Some(b"x"), Some(b"x"), None),
            MergeOutcome::Applied(None)
        );
    }

    #[test]
    fn deletion_against_local_edit_conflicts() {
        assert!(matches!(
            merge_file(Some(b"x\n"), Some(b"edited\n"), None),
            MergeOutcome::Conflicted(_)
        ));
    }

    #[test]
    fn new_template_file_is_added() {
        assert_eq!(
            merge_file(None, None, Some(b"new\n")),
            MergeOutcome::Applied(Some(b"new\n".to_vec()))
        );
    }

    #[test]
    fn local_only_file_is_kept() {
        assert_eq!(
            merge_file(None, Some(b"mine\n"), None),
            MergeOutcome::Applied(Some(b"mine\n".to_vec()))
        );
    }

    #[test]
    fn add_add_with_different_content_conflicts() {
        assert!(matches!(
            merge_file(None, Some(b"mine\n"), Some(b"theirs\n")),
            MergeOutcome::Conflicted(_)
        ));
    }

    #[test]
    fn binary_edits_on_both_sides_conflict() {
        let hunks = match merge_file(Some(b"\0a"), Some(b"\0b"), Some(b"\0c")) {
            MergeOutcome::Conflicted(hunks) => hunks,
            other => panic!("expected conflict, got {other:?}"),
        };
        assert_eq!(hunks[0].ours, vec!["<binary, 2 bytes>\n".to_string()]);
    }

    #[test]
    fn missing_trailing_newline_is_preserved() {
        assert_eq!(merged("a\nb", "A\nb", "a\nb"), "A\nb");
        assert_eq!(merged("a\nb\nc", "A\nb\nc", "a\nb\nC"), "A\nb\nC");
    }

    #[test]
    fn diff_hunks_finds_replacements() {
        let base = ["a\n", "b\n", "c\n"];
        let other = ["a\n", "x\n", "y\n", "c\n"];
        assert_eq!(
            diff_hunks(&base, &other).unwrap(),
            vec![Hunk {
                base_start: 1,
                base_end: 2,
                other_start: 1,
                other_end: 3,
            }]
        );
    }
}
