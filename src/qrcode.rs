use image::DynamicImage;
use rqrr::PreparedImage;
use std::path::Path;

use crate::normalize::MIGRATION_SCHEME;

pub fn read_migration_qr(image: DynamicImage) -> anyhow::Result<String> {
    let gray_img = image.to_luma8();

    let mut prepared = PreparedImage::prepare(gray_img);
    let grids = prepared.detect_grids();

    if grids.is_empty() {
        anyhow::bail!("No QR codes found in the image");
    }

    // Decode first QR code
    let (_, content) = grids[0].decode()?;

    if content.starts_with(&format!("{MIGRATION_SCHEME}://")) {
        tracing::debug!(len = content.len(), "read migration QR code");
        Ok(content)
    } else {
        anyhow::bail!("The QR code does not contain an {MIGRATION_SCHEME}:// URI")
    }
}

pub fn read_migration_qr_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<String> {
    let image = image::open(path)?;
    read_migration_qr(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::qrcode::QrCode;

    fn qr_image(content: &str) -> DynamicImage {
        let code = QrCode::new(content.as_bytes()).unwrap();
        DynamicImage::ImageLuma8(code.render::<image::Luma<u8>>().module_dimensions(4, 4).build())
    }

    #[test]
    fn reads_migration_uri() {
        let uri = "otpauth-migration://offline?data=CjkKCkhlbGxvId6tvu8SHEV4YW1wbGU6dXNlcm5hbWVAZXhhbXBsZS5jb20aB0V4YW1wbGUgASgBMAIQARgBIAAo6PbxNg";
        assert_eq!(read_migration_qr(qr_image(uri)).unwrap(), uri);
    }

    #[test]
    fn rejects_other_qr_content() {
        let err = read_migration_qr(qr_image("otpauth://totp/alice?secret=JBSWY3DPEHPK3PXP"))
            .unwrap_err();
        assert!(err.to_string().contains("otpauth-migration://"));
    }

    #[test]
    fn reports_missing_qr_code() {
        let blank = DynamicImage::new_luma8(64, 64);
        assert!(read_migration_qr(blank).is_err());
    }
}
