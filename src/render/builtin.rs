//! Built-in renderer: copies the template and merges later template changes
//! into the local tree against the baseline kept in `.dotsync/baseline/`.
use anyhow::{Context as _, Result, bail};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::merge::{MergeOutcome, merge_file};
use super::{Conflict, RenderOutcome, Renderer, source};
use crate::config::{BACKUPS_DIR, LOCK_FILE, STATE_DIR};
use crate::platform::Platform;
use crate::sync::SyncContext;

/// Files of a tree keyed by `/`-separated relative path.
type FileSet = BTreeMap<String, PathBuf>;

/// Renderer that needs no external tool.
#[derive(Debug, Clone)]
pub struct BuiltinRenderer {
    cache_dir: PathBuf,
}

impl BuiltinRenderer {
    /// Create a renderer caching remote templates under `cache_dir`.
    #[must_use]
    pub const fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Template directory on disk, or `None` for a remote in a dry run:
    /// fetching would replace the cached clone.
    fn fetch(&self, ctx: &SyncContext, template: &str) -> Result<Option<PathBuf>> {
        if ctx.dry_run && !source::is_local(template) {
            ctx.log.dry_run(&format!(
                "would clone {template} into {}",
                source::cache_path(&self.cache_dir, template).display()
            ));
            return Ok(None);
        }
        source::fetch(template, &self.cache_dir, &ctx.cancelled).map(Some)
    }
}

impl Renderer for BuiltinRenderer {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn render_new(&self, ctx: &SyncContext, template: &str, _trust: bool) -> Result<RenderOutcome> {
        let Some(src) = self.fetch(ctx, template)? else {
            return Ok(RenderOutcome::Applied { changed: vec![] });
        };
        let files = template_files(&src, &ctx.platform)?;
        if files.is_empty() {
            bail!("template {template} contains no files");
        }
        let changed: Vec<String> = files.keys().cloned().collect();

        if ctx.dry_run {
            ctx.log.dry_run(&format!(
                "would render {} files from {template}",
                changed.len()
            ));
            return Ok(RenderOutcome::Applied { changed });
        }

        for (rel, path) in &files {
            copy_file(path, &join_relative(ctx.root(), rel))?;
        }
        write_baseline(&ctx.layout.baseline_dir(), &files)?;
        ctx.log
            .info(&format!("rendered {} files from {template}", changed.len()));
        Ok(RenderOutcome::Applied { changed })
    }

    fn render_update(
        &self,
        ctx: &SyncContext,
        template: &str,
        _trust: bool,
    ) -> Result<RenderOutcome> {
        let Some(src) = self.fetch(ctx, template)? else {
            return Ok(RenderOutcome::Applied { changed: vec![] });
        };
        let theirs = template_files(&src, &ctx.platform)?;
        let baseline_dir = ctx.layout.baseline_dir();
        let base = tree_files(&baseline_dir)?;

        let paths: BTreeSet<&String> = base.keys().chain(theirs.keys()).collect();
        let mut writes: Vec<(String, Option<Vec<u8>>)> = Vec::new();
        let mut conflicts = Vec::new();

        for rel in paths {
            let base_bytes = read_optional(base.get(rel).map(PathBuf::as_path))?;
            let theirs_bytes = read_optional(theirs.get(rel).map(PathBuf::as_path))?;
            let local = join_relative(ctx.root(), rel);
            let ours_bytes = read_optional(Some(&local))?;

            match merge_file(
                base_bytes.as_deref(),
                ours_bytes.as_deref(),
                theirs_bytes.as_deref(),
            ) {
                MergeOutcome::Applied(result) => {
                    if result != ours_bytes {
                        writes.push((rel.clone(), result));
                    }
                }
                MergeOutcome::Conflicted(hunks) => conflicts.push(Conflict {
                    path: rel.clone(),
                    hunks,
                }),
            }
        }

        if !conflicts.is_empty() {
            return Ok(RenderOutcome::Conflicted(conflicts));
        }

        let changed: Vec<String> = writes.iter().map(|(rel, _)| rel.clone()).collect();

        if ctx.dry_run {
            for (rel, content) in &writes {
                let verb = if content.is_some() { "update" } else { "remove" };
                ctx.log.dry_run(&format!("would {verb} {rel}"));
            }
            return Ok(RenderOutcome::Applied { changed });
        }

        for (rel, content) in writes {
            let path = join_relative(ctx.root(), &rel);
            match content {
                Some(bytes) => {
                    ensure_parent(&path)?;
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("writing {}", path.display()))?;
                    ctx.log.debug(&format!("updated {rel}"));
                }
                None => {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("removing {}", path.display()))?;
                    ctx.log.debug(&format!("removed {rel}"));
                }
            }
        }

        if baseline_dir.exists() {
            std::fs::remove_dir_all(&baseline_dir)
                .with_context(|| format!("clearing {}", baseline_dir.display()))?;
        }
        write_baseline(&baseline_dir, &theirs)?;
        Ok(RenderOutcome::Applied { changed })
    }
}

/// Template files for `platform`: skips `.git`, the foreign platform folder
/// and names dotsync reserves at the tree root.
fn template_files(dir: &Path, platform: &Platform) -> Result<FileSet> {
    let foreign = platform.foreign_category().dir_name();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name();
            if name == ".git" {
                return false;
            }
            entry.depth() != 1
                || ![foreign, STATE_DIR, BACKUPS_DIR, LOCK_FILE]
                    .iter()
                    .any(|reserved| name == *reserved)
        });
    collect_files(dir, walker)
}

/// Every file under `dir`; empty when `dir` does not exist.
fn tree_files(dir: &Path) -> Result<FileSet> {
    if !dir.is_dir() {
        return Ok(FileSet::new());
    }
    collect_files(dir, WalkDir::new(dir).min_depth(1).into_iter())
}

fn collect_files(
    dir: &Path,
    walker: impl Iterator<Item = walkdir::Result<walkdir::DirEntry>>,
) -> Result<FileSet> {
    let mut files = FileSet::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} is outside {}", entry.path().display(), dir.display()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.insert(rel, entry.into_path());
    }
    Ok(files)
}

fn write_baseline(baseline_dir: &Path, files: &FileSet) -> Result<()> {
    for (rel, path) in files {
        copy_file(path, &join_relative(baseline_dir, rel))?;
    }
    Ok(())
}

fn read_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    ensure_parent(to)?;
    std::fs::copy(from, to)
        .with_context(|| format!("copying {} to {}", from.display(), to.display()))?;
    Ok(())
}

fn join_relative(base: &Path, rel: &str) -> PathBuf {
    rel.split('/').fold(base.to_path_buf(), |acc, seg| acc.join(seg))
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
    use crate::logging::{Log, Logger};
    use crate::platform::Os;
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        template: PathBuf,
        root: PathBuf,
        cache: PathBuf,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let fx = Self {
                template: dir.path().join("template"),
                root: dir.path().join("tree"),
                cache: dir.path().join("cache"),
                _dir: dir,
            };
            std::fs::create_dir_all(&fx.root).unwrap();
            for (rel, content) in files {
                fx.write_template(rel, content);
            }
            fx
        }

        fn write_template(&self, rel: &str, content: &str) {
            let path = join_relative(&self.template, rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn context(&self) -> SyncContext {
            let log: Arc<dyn Log> = Arc::new(Logger::with_log_file(None));
            SyncContext::new(&self.root, Path::new("/home/u"), log)
                .with_platform(Platform::new(Os::Unix))
        }

        fn renderer(&self) -> BuiltinRenderer {
            BuiltinRenderer::new(self.cache.clone())
        }

        fn template_arg(&self) -> String {
            self.template.to_string_lossy().into_owned()
        }

        fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(join_relative(&self.root, rel)).unwrap()
        }
    }

    #[test]
    fn render_new_copies_host_files_and_baseline() {
        let fx = Fixture::new(&[
            ("dotsync.json", "{}"),
            ("common/.gitconfig", "[user]\n"),
            ("unix/.zshrc", "export A=1\n"),
            ("windows/profile.ps1", "Set-Alias\n"),
            (".git/HEAD", "ref: refs/heads/main\n"),
        ]);

        let outcome = fx
            .renderer()
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();

        assert_eq!(
            outcome,
            RenderOutcome::Applied {
                changed: vec![
                    "common/.gitconfig".to_string(),
                    "dotsync.json".to_string(),
                    "unix/.zshrc".to_string(),
                ]
            }
        );
        assert_eq!(fx.read("unix/.zshrc"), "export A=1\n");
        assert!(!fx.root.join("windows").exists());
        assert!(!fx.root.join(".git").exists());
        assert_eq!(fx.read(".dotsync/baseline/common/.gitconfig"), "[user]\n");
    }

    #[test]
    fn render_new_rejects_empty_template() {
        let fx = Fixture::new(&[]);
        std::fs::create_dir_all(&fx.template).unwrap();
        let err = fx
            .renderer()
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap_err();
        assert!(err.to_string().contains("contains no files"));
    }

    #[test]
    fn render_new_dry_run_writes_nothing() {
        let fx = Fixture::new(&[("common/.gitconfig", "[user]\n")]);
        let ctx = fx.context().with_dry_run(true);
        fx.renderer()
            .render_new(&ctx, &fx.template_arg(), false)
            .unwrap();
        assert_eq!(std::fs::read_dir(&fx.root).unwrap().count(), 0);
    }

    #[test]
    fn dry_run_leaves_remote_cache_alone() {
        let fx = Fixture::new(&[]);
        let url = "https://example.com/dotfiles.git";
        let cached = source::cache_path(&fx.cache, url);
        std::fs::create_dir_all(&cached).unwrap();
        std::fs::write(cached.join("marker"), "kept").unwrap();

        let ctx = fx.context().with_dry_run(true);
        let renderer = fx.renderer();
        assert_eq!(
            renderer.render_new(&ctx, url, false).unwrap(),
            RenderOutcome::Applied { changed: vec![] }
        );
        renderer.render_update(&ctx, url, false).unwrap();
        assert_eq!(std::fs::read_to_string(cached.join("marker")).unwrap(), "kept");
        assert_eq!(std::fs::read_dir(&fx.root).unwrap().count(), 0);
    }

    #[test]
    fn update_merges_template_change_into_local_edit() {
        let fx = Fixture::new(&[("common/.zshrc", "alias ll='ls -l'\nexport EDITOR=vi\nsetopt autocd\n")]);
        let renderer = fx.renderer();
        renderer
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();

        std::fs::write(
            fx.root.join("common/.zshrc"),
            "alias ll='ls -la'\nexport EDITOR=vi\nsetopt autocd\n",
        )
        .unwrap();
        fx.write_template(
            "common/.zshrc",
            "alias ll='ls -l'\nexport EDITOR=vi\nsetopt autocd extendedglob\n",
        );

        let outcome = renderer
            .render_update(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Applied {
                changed: vec!["common/.zshrc".to_string()]
            }
        );
        assert_eq!(
            fx.read("common/.zshrc"),
            "alias ll='ls -la'\nexport EDITOR=vi\nsetopt autocd extendedglob\n"
        );
        assert_eq!(
            fx.read(".dotsync/baseline/common/.zshrc"),
            "alias ll='ls -l'\nexport EDITOR=vi\nsetopt autocd extendedglob\n"
        );
    }

    #[test]
    fn conflicting_update_leaves_tree_untouched() {
        let fx = Fixture::new(&[
            ("common/.gitconfig", "[user]\n\tname = a\n"),
            ("common/.vimrc", "set nu\n"),
        ]);
        let renderer = fx.renderer();
        renderer
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();

        std::fs::write(fx.root.join("common/.gitconfig"), "[user]\n\tname = local\n").unwrap();
        fx.write_template("common/.gitconfig", "[user]\n\tname = upstream\n");
        fx.write_template("common/.vimrc", "set nu rnu\n");

        let outcome = renderer
            .render_update(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        let RenderOutcome::Conflicted(conflicts) = outcome else {
            panic!("expected conflict");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, "common/.gitconfig");
        assert_eq!(conflicts[0].hunks[0].theirs, vec!["\tname = upstream\n"]);

        // Neither the conflicting nor the clean file was written.
        assert_eq!(fx.read("common/.gitconfig"), "[user]\n\tname = local\n");
        assert_eq!(fx.read("common/.vimrc"), "set nu\n");
        assert_eq!(
            fx.read(".dotsync/baseline/common/.gitconfig"),
            "[user]\n\tname = a\n"
        );
    }

    #[test]
    fn update_adds_and_removes_files() {
        let fx = Fixture::new(&[("common/.old", "old\n"), ("common/.keep", "keep\n")]);
        let renderer = fx.renderer();
        renderer
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();

        std::fs::remove_file(fx.template.join("common/.old")).unwrap();
        fx.write_template("unix/.new", "new\n");

        renderer
            .render_update(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        assert!(!fx.root.join("common/.old").exists());
        assert_eq!(fx.read("unix/.new"), "new\n");
        assert!(!fx.root.join(".dotsync/baseline/common/.old").exists());
    }

    #[test]
    fn update_keeps_local_only_files() {
        let fx = Fixture::new(&[("common/.a", "a\n")]);
        let renderer = fx.renderer();
        renderer
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        std::fs::write(fx.root.join("common/.mine"), "mine\n").unwrap();

        let outcome = renderer
            .render_update(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Applied { changed: vec![] });
        assert_eq!(fx.read("common/.mine"), "mine\n");
    }

    #[test]
    fn update_dry_run_writes_nothing() {
        let fx = Fixture::new(&[("common/.a", "a\n")]);
        let renderer = fx.renderer();
        renderer
            .render_new(&fx.context(), &fx.template_arg(), false)
            .unwrap();
        fx.write_template("common/.a", "b\n");

        let outcome = renderer
            .render_update(&fx.context().with_dry_run(true), &fx.template_arg(), false)
            .unwrap();
        assert_eq!(
            outcome,
            RenderOutcome::Applied {
                changed: vec!["common/.a".to_string()]
            }
        );
        assert_eq!(fx.read("common/.a"), "a\n");
        assert_eq!(fx.read(".dotsync/baseline/common/.a"), "a\n");
    }
}
