//! Application constants

/// Maximum number of media attachments per reply batch (X API limit)
pub const MAX_MEDIA_ATTACHMENTS: usize = 4;

/// Maximum size of a single media attachment (5 MiB)
pub const MAX_MEDIA_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Multipart body limit: four attachments plus form text with headroom
pub const MAX_FORM_BODY_SIZE: usize = 25 * 1024 * 1024;
