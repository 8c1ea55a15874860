// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rule conversion logic.
//!
//! Convert rule documents from the source tree into distributable rule files.
//! Every source document maps to exactly one output file per target tree, at
//! the same relative path as the source with the extension swapped, e.g.,
//! `rules/a/b/c.md` becomes `<target>/a/b/c.mdc`.
//!
//! # Output Layout
//!
//! Converted rules start with a fixed metadata block, followed by the
//! rewritten body:
//!
//! ```text
//! ---
//! ruleId: x
//! ruleType: Linter
//! description: Title
//! globs: []
//! alwaysApply: false
//! ---
//! Title
//! Body text.
//! ```
//!
//! Conversion is deterministic, so converting an unchanged source twice
//! produces byte-identical output.

use crate::{
    config::SyncConfig,
    rule::{extract::extract, links::LinkRewriter, RuleDocument},
};

use serde::Serialize;
use std::{
    collections::HashSet,
    fs::{read_to_string, remove_file, write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Converts rule documents into both target trees.
#[derive(Debug, Clone)]
pub struct Converter {
    source_root: PathBuf,
    targets: [PathBuf; 2],
    source_extension: String,
    target_extension: String,
    core_files: HashSet<String>,
    links: LinkRewriter,
}

impl Converter {
    /// Construct new converter from configuration.
    ///
    /// The source root is canonicalized when it exists, so that absolute
    /// paths reported by a file watcher resolve against it.
    pub fn new(config: &SyncConfig) -> Self {
        let source_root = config.source_dir();
        let source_root = source_root.canonicalize().unwrap_or(source_root);
        let convert = &config.convert;

        Self {
            source_root,
            targets: config.target_dirs(),
            source_extension: convert.source_extension.clone(),
            target_extension: convert.target_extension.clone(),
            core_files: convert.core_files.iter().cloned().collect(),
            links: LinkRewriter::new(
                convert.link_rewrite,
                &convert.source_extension,
                &convert.target_extension,
            ),
        }
    }

    pub fn source_root(&self) -> &Path {
        self.source_root.as_path()
    }

    pub fn targets(&self) -> &[PathBuf; 2] {
        &self.targets
    }

    pub fn source_extension(&self) -> &str {
        self.source_extension.as_str()
    }

    pub fn target_extension(&self) -> &str {
        self.target_extension.as_str()
    }

    /// Check if file name of source is in the core file list.
    pub fn is_core_file(&self, source: impl AsRef<Path>) -> bool {
        source
            .as_ref()
            .file_name()
            .is_some_and(|name| self.core_files.contains(name.to_string_lossy().as_ref()))
    }

    /// Path of source relative to the source root.
    ///
    /// # Errors
    ///
    /// - Return [`ConvertError::OutsideSourceRoot`] if source does not live
    ///   under the source root.
    pub fn relative_source(&self, source: impl AsRef<Path>) -> Result<PathBuf> {
        let source = source.as_ref();
        if let Ok(relative) = source.strip_prefix(&self.source_root) {
            return Ok(relative.to_path_buf());
        }

        // INVARIANT: Source may be gone already, so canonicalize its parent.
        let canonical = source
            .parent()
            .and_then(|parent| parent.canonicalize().ok())
            .zip(source.file_name())
            .map(|(parent, name)| parent.join(name));

        canonical
            .as_deref()
            .and_then(|path| path.strip_prefix(&self.source_root).ok())
            .map(Path::to_path_buf)
            .ok_or_else(|| ConvertError::OutsideSourceRoot {
                path: source.to_path_buf(),
                root: self.source_root.clone(),
            })
    }

    /// Determine mirrored output path of source in both target trees.
    ///
    /// # Errors
    ///
    /// - Return [`ConvertError::OutsideSourceRoot`] if source does not live
    ///   under the source root.
    /// - Return [`ConvertError::WrongExtension`] if source does not have the
    ///   source extension.
    pub fn output_paths(&self, source: impl AsRef<Path>) -> Result<[PathBuf; 2]> {
        let source = source.as_ref();
        if !crate::path::has_extension(source, &self.source_extension) {
            return Err(ConvertError::WrongExtension {
                path: source.to_path_buf(),
                extension: self.source_extension.clone(),
            });
        }

        let relative = self.relative_source(source)?.with_extension(&self.target_extension);
        Ok([self.targets[0].join(&relative), self.targets[1].join(&relative)])
    }

    /// Render converted rule file from rule document.
    ///
    /// # Errors
    ///
    /// - Return [`ConvertError::Render`] if metadata cannot be serialized.
    pub fn render(&self, document: &RuleDocument) -> Result<Rendered> {
        let metadata = &document.metadata;
        let description = metadata
            .title
            .as_deref()
            .or(metadata.description.as_deref())
            .unwrap_or_default();

        let forced_always_apply = self.is_core_file(&document.path);
        let always_apply = forced_always_apply || metadata.always_apply.unwrap_or(false);

        let header = RuleHeader {
            rule_id: metadata.rule_id.as_deref().unwrap_or_default(),
            rule_type: metadata.rule_type.as_deref().unwrap_or_default(),
            description,
            globs: metadata.globs.as_deref().unwrap_or_default(),
            always_apply,
        };
        let header = serde_yaml::to_string(&header)?;
        let (body, links_rewritten) = self.links.rewrite(&document.body);

        Ok(Rendered {
            text: format!("---\n{header}---\n{body}"),
            forced_always_apply,
            placeholder_description: description.trim().is_empty(),
            links_rewritten,
        })
    }

    /// Convert source into both target trees.
    ///
    /// Never fails outright. Failures are logged and recorded in the
    /// returned [`ConversionRecord`]. A failure to write one target does not
    /// prevent writing the other.
    #[instrument(skip(self, source), level = "debug")]
    pub fn convert(&self, source: impl AsRef<Path>) -> ConversionRecord {
        let source = source.as_ref();
        let mut record = ConversionRecord::new(source);

        let prepared = self.output_paths(source).and_then(|outputs| {
            let content = read_to_string(source).map_err(|err| ConvertError::Read {
                source: err,
                path: source.to_path_buf(),
            })?;
            let rendered = self.render(&extract(source, &content))?;
            Ok((outputs, rendered))
        });

        let (outputs, rendered) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                warn!("cannot convert {:?}: {error}", source.display());
                record.errors.push(error);
                return record;
            }
        };

        record.forced_always_apply = rendered.forced_always_apply;
        record.placeholder_description = rendered.placeholder_description;
        record.links_rewritten = rendered.links_rewritten;

        for output in outputs {
            match write_output(&output, &rendered.text) {
                Ok(()) => {
                    debug!("wrote {:?}", output.display());
                    record.outputs.push(output);
                }
                Err(error) => {
                    warn!("cannot write {:?}: {error}", output.display());
                    record.errors.push(error);
                }
            }
        }

        if record.is_success() {
            info!("converted {:?}", source.display());
        }

        record
    }

    /// Remove converted files of a source that no longer exists.
    ///
    /// Outputs that are already missing are not an error.
    #[instrument(skip(self, source), level = "debug")]
    pub fn remove_outputs(&self, source: impl AsRef<Path>) -> ConversionRecord {
        let source = source.as_ref();
        let mut record = ConversionRecord::new(source);
        record.removed = true;

        let outputs = match self.output_paths(source) {
            Ok(outputs) => outputs,
            Err(error) => {
                warn!("cannot remove outputs of {:?}: {error}", source.display());
                record.errors.push(error);
                return record;
            }
        };

        for output in outputs {
            if !output.exists() {
                continue;
            }

            match remove_file(&output) {
                Ok(()) => {
                    info!("removed {:?}", output.display());
                    record.outputs.push(output);
                }
                Err(err) => {
                    warn!("cannot remove {:?}: {err}", output.display());
                    record.errors.push(ConvertError::Remove {
                        source: err,
                        path: output,
                    });
                }
            }
        }

        record
    }
}

/// Fixed metadata block of a converted rule file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleHeader<'a> {
    rule_id: &'a str,
    rule_type: &'a str,
    description: &'a str,
    globs: &'a [String],
    always_apply: bool,
}

/// Converted rule file contents along with facts about the conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub forced_always_apply: bool,
    pub placeholder_description: bool,
    pub links_rewritten: usize,
}

/// Outcome of converting, or removing, one rule document.
#[derive(Debug)]
pub struct ConversionRecord {
    /// Source rule document.
    pub source: PathBuf,

    /// Output files written, or removed.
    pub outputs: Vec<PathBuf>,

    /// Source vanished, so its outputs were removed.
    pub removed: bool,

    /// File name is a core file, so `alwaysApply` was forced on.
    pub forced_always_apply: bool,

    /// No title or description was available.
    pub placeholder_description: bool,

    /// Number of cross references rewritten.
    pub links_rewritten: usize,

    /// Everything that went wrong.
    pub errors: Vec<ConvertError>,
}

impl ConversionRecord {
    fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            outputs: Vec::new(),
            removed: false,
            forced_always_apply: false,
            placeholder_description: false,
            links_rewritten: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

fn write_output(output: &Path, text: &str) -> Result<()> {
    if let Some(parent) = output.parent() {
        mkdirp::mkdirp(parent).map_err(|err| ConvertError::CreateDir {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    write(output, text.as_bytes()).map_err(|err| ConvertError::Write {
        source: err,
        path: output.to_path_buf(),
    })
}

/// Rule conversion error types.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Source does not live under source root.
    #[error("{:?} is not under source root {:?}", path.display(), root.display())]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    /// Source is not a rule document.
    #[error("{:?} does not have extension {extension:?}", path.display())]
    WrongExtension { path: PathBuf, extension: String },

    /// Source cannot be read.
    #[error("failed to read source {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Metadata block cannot be serialized.
    #[error(transparent)]
    Render(#[from] serde_yaml::Error),

    /// Target directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Converted rule cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Converted rule cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ConvertError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::links::LinkRewrite;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{create_dir_all, read_to_string};
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        converter: Converter,
    }

    impl Fixture {
        fn new(link_rewrite: LinkRewrite) -> anyhow::Result<Self> {
            let root = tempfile::tempdir()?;
            create_dir_all(root.path().join("rules"))?;

            let mut config = SyncConfig::default();
            config.paths.workspace = root.path().to_path_buf();
            config.paths.primary_target = "out/one".into();
            config.paths.secondary_target = "out/two".into();
            config.convert.core_files = vec!["core.md".into()];
            config.convert.link_rewrite = link_rewrite;
            let converter = Converter::new(&config);

            Ok(Self { root, converter })
        }

        fn source(&self, relative: &str, content: &str) -> anyhow::Result<PathBuf> {
            let path = self.converter.source_root().join(relative);
            create_dir_all(path.parent().unwrap())?;
            std::fs::write(&path, content)?;
            Ok(path)
        }

        fn output(&self, target: &str, relative: &str) -> PathBuf {
            self.root.path().join("out").join(target).join(relative)
        }
    }

    #[test]
    fn convert_writes_both_targets() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source(
            "rule-x.md",
            "# ruleId: x\n# ruleType: Linter\n# Title\nBody text.",
        )?;

        let record = fixture.converter.convert(&source);
        assert!(record.is_success());

        let expect = indoc! {"
            ---
            ruleId: x
            ruleType: Linter
            description: Title
            globs: []
            alwaysApply: false
            ---
            Title
            Body text."};
        for target in ["one", "two"] {
            let result = read_to_string(fixture.output(target, "rule-x.mdc"))?;
            assert_eq!(result, expect);
        }
        assert_eq!(record.outputs.len(), 2);
        assert!(!record.forced_always_apply);
        assert!(!record.placeholder_description);

        Ok(())
    }

    #[test]
    fn output_paths_mirror_relative_path() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source("a/b/c.md", "text")?;

        let result = fixture.converter.output_paths(&source)?;
        let expect = [
            fixture.output("one", "a/b/c.mdc"),
            fixture.output("two", "a/b/c.mdc"),
        ];
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn output_paths_reject_foreign_sources() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let outside = fixture.root.path().join("elsewhere.md");
        std::fs::write(&outside, "x")?;
        let wrong = fixture.source("notes.txt", "x")?;

        assert!(matches!(
            fixture.converter.output_paths(&outside),
            Err(ConvertError::OutsideSourceRoot { .. })
        ));
        assert!(matches!(
            fixture.converter.output_paths(&wrong),
            Err(ConvertError::WrongExtension { .. })
        ));

        Ok(())
    }

    #[test]
    fn document_without_metadata_in_substring_mode() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Substring)?;
        let content = "Read helper.md first.\nSee [core](core.md).\n";
        let source = fixture.source("plain.md", content)?;

        let record = fixture.converter.convert(&source);
        assert!(record.is_success());
        assert_eq!(record.links_rewritten, 2);

        let expect = indoc! {"
            ---
            ruleId: ''
            ruleType: ''
            description: Read helper.md first.
            globs: []
            alwaysApply: false
            ---
            Read helper.mdc first.
            See [core](core.mdc).
        "};
        let result = read_to_string(fixture.output("one", "plain.mdc"))?;
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn core_file_always_applies() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source("nested/core.md", "# alwaysApply: false\n# Core\nRules.\n")?;

        let record = fixture.converter.convert(&source);
        assert!(record.forced_always_apply);

        let result = read_to_string(fixture.output("two", "nested/core.mdc"))?;
        assert!(result.contains("alwaysApply: true\n"));

        Ok(())
    }

    #[test]
    fn explicit_always_apply_passes_through() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source(
            "always.md",
            "# alwaysApply: true\n# globs: *.rs\n# description: Rust\nText.\n",
        )?;

        let record = fixture.converter.convert(&source);
        assert!(!record.forced_always_apply);

        let result = read_to_string(fixture.output("one", "always.mdc"))?;
        assert!(result.contains("alwaysApply: true\n"));
        assert!(result.contains("description: Rust\n"));

        Ok(())
    }

    #[test]
    fn conversion_is_idempotent() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source(
            "twice.md",
            "---\ntitle: Twice\nglobs: [\"*.md\"]\n---\nLink to [x](x.md).\n",
        )?;

        fixture.converter.convert(&source);
        let first = read_to_string(fixture.output("one", "twice.mdc"))?;
        fixture.converter.convert(&source);
        let second = read_to_string(fixture.output("one", "twice.mdc"))?;

        assert_eq!(first, second);
        assert!(first.ends_with("Link to [x](x.mdc).\n"));

        Ok(())
    }

    #[test]
    fn empty_document_uses_placeholder_description() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source("empty.md", "")?;

        let record = fixture.converter.convert(&source);
        assert!(record.is_success());
        assert!(record.placeholder_description);

        Ok(())
    }

    #[test]
    fn missing_source_is_a_failure_record() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.converter.source_root().join("ghost.md");

        let record = fixture.converter.convert(&source);
        assert!(!record.is_success());
        assert!(record.outputs.is_empty());
        assert!(matches!(record.errors[0], ConvertError::Read { .. }));

        Ok(())
    }

    #[test]
    fn remove_outputs_deletes_mirrors() -> anyhow::Result<()> {
        let fixture = Fixture::new(LinkRewrite::Markdown)?;
        let source = fixture.source("gone/rule.md", "Body.\n")?;
        fixture.converter.convert(&source);
        std::fs::remove_file(&source)?;

        let record = fixture.converter.remove_outputs(&source);
        assert!(record.is_success());
        assert!(record.removed);
        assert_eq!(record.outputs.len(), 2);
        assert!(!fixture.output("one", "gone/rule.mdc").exists());
        assert!(!fixture.output("two", "gone/rule.mdc").exists());

        Ok(())
    }
}
