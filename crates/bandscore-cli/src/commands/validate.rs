//! The `bandscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

pub fn execute(paper_path: PathBuf) -> Result<()> {
    let papers = if paper_path.is_dir() {
        bandscore_core::parser::load_paper_directory(&paper_path)?
    } else {
        vec![bandscore_core::parser::parse_paper(&paper_path)?]
    };

    if papers.is_empty() {
        anyhow::bail!("no valid papers found in {}", paper_path.display());
    }

    let mut total_warnings = 0;

    for paper in &papers {
        println!(
            "Paper: {} [{}] ({} listening sections, {} reading passages, {} writing tasks, {} speaking parts)",
            paper.title,
            paper.id,
            paper.listening.len(),
            paper.reading.len(),
            paper.writing.len(),
            paper.speaking.len(),
        );

        let warnings = bandscore_core::parser::lint_paper(paper);
        for w in &warnings {
            let prefix = w
                .location
                .as_ref()
                .map(|loc| format!("  [{loc}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All papers valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
