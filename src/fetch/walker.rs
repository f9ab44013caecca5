//! Attachment extraction over a body tree.

use crate::model::attachment::AttachmentPart;
use crate::model::message::{BodyContent, BodyPart};

/// Collect the downloadable leaves of `body` in document order.
///
/// A leaf qualifies when it has a non-empty file name and is either
/// declared `Content-Disposition: attachment` or `include_inline` is set.
/// Multipart containers are walked depth-first; attached messages are not
/// expanded. Duplicate file names are all returned.
pub fn collect_attachments(body: &BodyPart, include_inline: bool) -> Vec<AttachmentPart<'_>> {
    let mut found = Vec::new();
    walk(body, include_inline, &mut found);
    found
}

fn walk<'a>(part: &'a BodyPart, include_inline: bool, found: &mut Vec<AttachmentPart<'a>>) {
    match &part.content {
        BodyContent::Multipart(children) => {
            for child in children {
                walk(child, include_inline, found);
            }
        }
        BodyContent::NestedMessage => {
            tracing::debug!(
                content_type = %part.content_type,
                "Skipping attached message"
            );
        }
        BodyContent::Text(_) | BodyContent::Stream(_) => {
            let Some(candidate) = AttachmentPart::from_part(part) else {
                return;
            };
            if include_inline || candidate.is_attachment() {
                found.push(candidate);
            }
        }
    }
}
