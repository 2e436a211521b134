//! CLI command execution.

use std::fmt::Write as _;

use color_eyre::eyre::{Result, WrapErr};

use crate::application::ImagePipeline;
use crate::domain::entities::ResolvedImage;
use crate::infrastructure::config::Command;

/// Runs one command against the pipeline and returns its printable output.
///
/// # Errors
/// Returns error if metadata cannot be derived, the output file cannot be
/// written, or the output cannot be formatted.
pub async fn execute(pipeline: &ImagePipeline, command: &Command) -> Result<String> {
    let mut out = String::new();

    match command {
        Command::Get { src, image, output } => {
            let resolved = pipeline.cache().get(src, &image.to_options()).await;
            match &resolved {
                ResolvedImage::Cached(cached) => {
                    writeln!(
                        out,
                        "{} ({}, {} bytes, {}x{} {})",
                        cached.locator,
                        cached.source,
                        cached.payload.len(),
                        cached.metadata.width,
                        cached.metadata.height,
                        cached.metadata.format
                    )?;
                    if let Some(path) = output {
                        tokio::fs::write(path, &cached.payload)
                            .await
                            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
                        writeln!(out, "Wrote {}", path.display())?;
                    }
                }
                ResolvedImage::Original(original) => {
                    writeln!(out, "{original} (fallback: fetch failed)")?;
                }
            }
        }
        Command::Preload { srcs, image } => {
            let results = pipeline.cache().preload(srcs, &image.to_options()).await;
            for (src, resolved) in srcs.iter().zip(&results) {
                let status = if resolved.is_cached() { "ok" } else { "failed" };
                writeln!(out, "{status:>6}  {src} -> {}", resolved.src())?;
            }
        }
        Command::Srcset { src, widths, image } => {
            let widths = if widths.is_empty() {
                pipeline.srcset_widths()
            } else {
                widths.as_slice()
            };
            let srcset = pipeline
                .optimizer()
                .generate_src_set(src, widths, &image.to_options());
            writeln!(out, "{srcset}")?;
        }
        Command::Metadata { src } => {
            let metadata = pipeline
                .optimizer()
                .image_metadata(src)
                .await
                .wrap_err_with(|| format!("No metadata available for {src}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&metadata)?)?;
        }
        Command::Placeholder { src, kind } => {
            let optimizer = pipeline.optimizer();
            let metadata = optimizer.image_metadata(src).await.ok();
            match optimizer.generate_placeholder(metadata.as_ref(), *kind) {
                Some(uri) => writeln!(out, "{uri}")?,
                None => writeln!(out, "(no placeholder)")?,
            }
        }
        Command::Probe => {
            let profile = pipeline.optimizer().profile();
            if let Some(formats) = &profile.formats {
                for (format, supported) in formats.probes() {
                    let status = if *supported { "supported" } else { "unsupported" };
                    writeln!(out, "{:<5} {status}", format.as_param())?;
                }
            }
            writeln!(out, "network {}", profile.network)?;
            writeln!(
                out,
                "best    {}",
                pipeline.optimizer().best_format(None)
            )?;
            writeln!(
                out,
                "quality {}",
                pipeline.optimizer().default_quality()
            )?;
        }
        Command::Stats => {
            writeln!(out, "{}", pipeline.cache().stats())?;
        }
        Command::Clear => {
            pipeline.cache().clear().await;
            writeln!(out, "Cache cleared")?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::entities::{ImageOptions, PlaceholderKind};
    use crate::domain::ports::mocks::{MemoryEntryStore, StaticFetcher, png_bytes};
    use crate::infrastructure::config::{AppConfig, ImageArgs};

    async fn pipeline() -> ImagePipeline {
        let fetcher = StaticFetcher::new()
            .with_resource("/uploads/a.png", png_bytes(6, 3, [0, 0, 255]))
            .with_failure("/uploads/broken.png");
        let pipeline = ImagePipeline::from_parts(
            &AppConfig::default(),
            &ImageOptions::default(),
            Arc::new(fetcher),
            Arc::new(MemoryEntryStore::new()),
        )
        .unwrap();
        pipeline.start().await;
        pipeline
    }

    #[tokio::test]
    async fn test_get_then_stats() {
        let pipeline = pipeline().await;
        let get = Command::Get {
            src: "/uploads/a.png".to_string(),
            image: ImageArgs::default(),
            output: None,
        };

        let first = execute(&pipeline, &get).await.unwrap();
        let second = execute(&pipeline, &get).await.unwrap();
        let stats = execute(&pipeline, &Command::Stats).await.unwrap();

        assert!(first.contains("(network,"));
        assert!(second.contains("(memory,"));
        assert!(stats.contains("1 entries"));
        assert!(stats.contains("50.0% hit rate"));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_get_writes_payload() {
        let pipeline = pipeline().await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.img");
        let get = Command::Get {
            src: "/uploads/a.png".to_string(),
            image: ImageArgs::default(),
            output: Some(path.clone()),
        };

        execute(&pipeline, &get).await.unwrap();

        assert_eq!(
            std::fs::read(&path).unwrap(),
            png_bytes(6, 3, [0, 0, 255]).to_vec()
        );
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_preload_reports_each_source() {
        let pipeline = pipeline().await;
        let preload = Command::Preload {
            srcs: vec!["/uploads/a.png".to_string(), "/uploads/broken.png".to_string()],
            image: ImageArgs::default(),
        };

        let out = execute(&pipeline, &preload).await.unwrap();
        let lines: Vec<_> = out.lines().collect();

        assert!(lines[0].trim_start().starts_with("ok"));
        assert!(lines[1].contains("failed"));
        assert!(lines[1].ends_with("-> /uploads/broken.png"));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_metadata_failure_is_an_error() {
        let pipeline = pipeline().await;
        let command = Command::Metadata {
            src: "/uploads/broken.png".to_string(),
        };

        assert!(execute(&pipeline, &command).await.is_err());
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_placeholder_and_clear() {
        let pipeline = pipeline().await;
        let placeholder = Command::Placeholder {
            src: "/uploads/a.png".to_string(),
            kind: PlaceholderKind::Color,
        };

        let uri = execute(&pipeline, &placeholder).await.unwrap();
        let cleared = execute(&pipeline, &Command::Clear).await.unwrap();

        assert!(uri.starts_with("data:image/svg+xml;base64,"));
        assert_eq!(cleared.trim(), "Cache cleared");
        assert_eq!(pipeline.cache().stats().entries, 0);
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_srcset_uses_configured_widths() {
        let pipeline = pipeline().await;
        let command = Command::Srcset {
            src: "/uploads/a.png".to_string(),
            widths: Vec::new(),
            image: ImageArgs::default(),
        };

        let out = execute(&pipeline, &command).await.unwrap();

        assert_eq!(out.matches("w,").count(), 4);
        assert!(out.trim_end().ends_with("1920w"));
        pipeline.shutdown().await;
    }
}
