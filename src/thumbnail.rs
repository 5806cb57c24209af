use eframe::egui::ColorImage;

/// Fetches and decodes a thumbnail image for the preview pane.
/// Strictly cosmetic, so every failure path is a silent `None`.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    // Blocking GET; callers run this on a blocking worker
    let resp = reqwest::blocking::get(url).ok()?.bytes().ok()?;
    let img = image::load_from_memory(&resp).ok()?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Some(ColorImage::from_rgba_unmultiplied(size, &img))
}
