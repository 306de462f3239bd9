// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turning Slack file attachments into message content
//!
//! Text files are inlined in a code fence and images become image parts
//! when the model accepts them. Everything else is replaced by a short note
//! so the model knows an attachment was left out.

use crate::llm::ContentPart;

use super::{MessagingSurface, SurfaceFile};

/// Slack file types passed to the model as text
const TEXT_FILE_TYPES: &[&str] = &[
    "text", "applescript", "boxnote", "c", "csharp", "cpp", "css", "csv", "clojure",
    "coffeescript", "cfm", "d", "dart", "diff", "dockerfile", "email", "fsharp", "fortran",
    "go", "groovy", "html", "handlebars", "haskell", "haxe", "java", "javascript", "json",
    "kotlin", "latex", "lisp", "lua", "markdown", "matlab", "mumps", "objc", "ocaml", "pascal",
    "perl", "php", "pig", "post", "powershell", "puppet", "python", "r", "rtf", "ruby", "rust",
    "sql", "sass", "scala", "scheme", "shell", "smalltalk", "swift", "tsv", "vb", "vbscript",
    "vcard", "velocity", "verilog", "xml", "yaml",
];

/// Slack file types passed to the model as images
const IMAGE_FILE_TYPES: &[&str] = &[
    "ai", "bmp", "eps", "gif", "indd", "jpg", "png", "psd", "svg", "tiff",
];

pub const VISION_UNSUPPORTED_NOTE: &str = "Model does not support images.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Text,
    Image,
    Other,
}

/// Category of a Slack file type
pub fn categorize(filetype: &str) -> FileCategory {
    if TEXT_FILE_TYPES.contains(&filetype) {
        FileCategory::Text
    } else if IMAGE_FILE_TYPES.contains(&filetype) {
        FileCategory::Image
    } else {
        FileCategory::Other
    }
}

/// Content parts for `files`, in attachment order.
pub async fn attachment_parts(
    surface: &dyn MessagingSurface,
    files: &[SurfaceFile],
    max_file_size: u64,
    supports_vision: bool,
) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(files.len());
    for file in files {
        parts.push(attachment_part(surface, file, max_file_size, supports_vision).await);
    }
    parts
}

async fn attachment_part(
    surface: &dyn MessagingSurface,
    file: &SurfaceFile,
    max_file_size: u64,
    supports_vision: bool,
) -> ContentPart {
    let filetype = file.filetype.as_deref().unwrap_or_default();
    let (Some(_), Some(mimetype)) = (file.filetype.as_deref(), file.mimetype.as_deref()) else {
        return skipped_type(filetype);
    };

    if file.size > max_file_size {
        tracing::info!(
            target: "slaick.slack",
            file = %file.name,
            size = file.size,
            "skipped file exceeding size limit"
        );
        return ContentPart::text(format!(
            "Skipped file exceeding size limit: {} ({} bytes)",
            file.name, file.size
        ));
    }

    let category = categorize(filetype);
    match category {
        FileCategory::Other => return skipped_type(filetype),
        FileCategory::Image if !supports_vision => {
            tracing::info!(target: "slaick.slack", file = %file.name, "model does not support images");
            return ContentPart::text(VISION_UNSUPPORTED_NOTE);
        }
        _ => {}
    }

    let data = match file.url_private.as_deref() {
        Some(url) => surface.download_file(url).await,
        None => Err(crate::error::SurfaceError::Api("file has no download URL".to_string()).into()),
    };
    let data = match data {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(target: "slaick.slack", file = %file.name, error = %e, "failed to download file");
            return ContentPart::text(format!("Failed to download file: {}", file.name));
        }
    };

    if category == FileCategory::Image {
        tracing::info!(target: "slaick.slack", file = %file.name, "added image");
        ContentPart::image(data, mimetype)
    } else {
        tracing::info!(target: "slaick.slack", file = %file.name, "added text file");
        ContentPart::text(format!(
            "File: {}\n```{}```",
            file.name,
            String::from_utf8_lossy(&data)
        ))
    }
}

fn skipped_type(filetype: &str) -> ContentPart {
    tracing::info!(target: "slaick.slack", filetype, "skipped unsupported file type");
    ContentPart::text(format!("Skipped unsupported file type: {}", filetype))
}
