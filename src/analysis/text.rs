use std::path::Path;
use std::sync::Arc;

use crate::bound::BoundSourceBuilder;
use crate::dispatch::DispatchContext;
use crate::error::Result;
use crate::repo::{RepoFile, Repository};

use super::{schedule_analysis, AnalysisHost, FileAnalyzer};

/// Uploads a file's text with only the synthetic file and checksum
/// definitions.
pub struct TextFileAnalyzer;

impl FileAnalyzer for TextFileAnalyzer {
    fn name(&self) -> &str {
        "text"
    }

    fn supported_extensions(&self) -> &[&str] {
        &[]
    }

    fn analyze(
        &self,
        host: &AnalysisHost,
        repo: &Arc<Repository>,
        ctx: &DispatchContext,
        file: &Arc<RepoFile>,
    ) -> Result<()> {
        schedule_analysis(host, repo, ctx, file, |host, repo, file| {
            let text = host.file_system.read_text(Path::new(file.path()))?;
            let builder =
                BoundSourceBuilder::with_text(file.source_info(repo.name()), file.primary_project(), text);
            builder.build()
        });
        Ok(())
    }
}
