use anyhow::Result;
use image::ImageFormat;
use image_hasher::{HashAlg, HasherConfig, ImageHash};

/// Perceptual hash of a PNG frame, used to decide whether the screen
/// changed enough to warrant a fresh classification call.
pub fn frame_hash(png_bytes: &[u8]) -> Result<String> {
    let img = image::load_from_memory_with_format(png_bytes, ImageFormat::Png)?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    Ok(hasher.hash_image(&img).to_base64())
}

/// Hamming distance between two frame hashes. Unparseable hashes compare
/// as maximally distant, which forces a reclassification.
pub fn hash_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}
