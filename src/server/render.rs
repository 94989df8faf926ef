use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use regex::{Captures, Regex};
use resvg::usvg::fontdb;
use resvg::{tiny_skia, usvg};

use crate::error::Error;
use crate::spotify::api::{ItemKind, Song};

const NAME_LIMIT: usize = 25;
const ALBUM_LIMIT: usize = 40;
const COVER_SIZE: u32 = 300;
const JPEG_QUALITY: u8 = 100;

/// SVG templates and icons, read on every request so they can be edited live
#[derive(Clone)]
pub struct Templates {
    dir: PathBuf,
    placeholder: Regex,
    fonts: Arc<fontdb::Database>,
}

impl Debug for Templates {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("dir", &self.dir)
            .field("fonts", &self.fonts.len())
            .finish()
    }
}

impl Templates {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        let mut fonts = fontdb::Database::new();
        fonts.load_system_fonts();
        log::debug!("loaded {} font faces for card rendering", fonts.len());

        Self {
            dir: dir.into(),
            placeholder: Regex::new(r"\$([A-Z]+)\$").expect("placeholder pattern is valid"),
            fonts: Arc::new(fonts),
        }
    }

    fn read(&self, name: &str) -> Result<String, Error> {
        let path = self.dir.join(name);
        std::fs::read_to_string(&path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))
    }

    pub fn nothing(&self) -> Result<String, Error> {
        self.read("nothing.svg")
    }

    pub fn icon(&self, kind: ItemKind) -> Result<String, Error> {
        let icon = match kind {
            ItemKind::Track => self.read("headphones.svg")?,
            ItemKind::Episode => self.read("microphone.svg")?,
        };
        Ok(data_uri("image/svg+xml", icon.as_bytes()))
    }

    /// Fill `playing.svg` with the card contents
    pub fn playing(&self, card: &Card) -> Result<String, Error> {
        let template = self.read("playing.svg")?;
        Ok(self.substitute(&template, card))
    }

    /// Rasterize a filled template into a JPEG the size of its canvas
    pub fn rasterize(&self, svg: &str) -> Result<Vec<u8>, Error> {
        let options = usvg::Options {
            fontdb: self.fonts.clone(),
            ..Default::default()
        };

        let tree = usvg::Tree::from_str(svg, &options).map_err(|e| Error::Render(e.to_string()))?;
        let size = tree.size().to_int_size();
        let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| Error::Render(format!("invalid canvas {}x{}", size.width(), size.height())))?;
        resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

        let rgba = RgbaImage::from_raw(size.width(), size.height(), pixmap.take())
            .ok_or_else(|| Error::Render("pixmap does not match its canvas".into()))?;
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(rgba)
            .to_rgb8()
            .write_to(&mut out, ImageOutputFormat::Jpeg(JPEG_QUALITY))
            .map_err(|e| Error::Render(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// Replace `$KEY$` placeholders. Unknown keys are left untouched.
    pub fn substitute(&self, template: &str, card: &Card) -> String {
        self.placeholder
            .replace_all(template, |captures: &Captures| match &captures[1] {
                "HEADPHONES" => Cow::Borrowed(card.icon.as_str()),
                "COVER" => Cow::Borrowed(card.cover.as_str()),
                "BARCODE" => Cow::Borrowed(card.barcode.as_str()),
                "ARTIST" => Cow::Owned(escape(&card.artist)),
                "ALBUM" => Cow::Owned(escape(&truncate(&card.album, ALBUM_LIMIT, ALBUM_LIMIT))),
                "NAME" => Cow::Owned(escape(&truncate(&card.name, NAME_LIMIT, NAME_LIMIT - 3))),
                _ => Cow::Owned(captures[0].to_string()),
            })
            .into_owned()
    }
}

/// Everything a rendered card shows. Images are already data URIs.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub icon: String,
    pub cover: String,
    pub barcode: String,
    pub artist: String,
    pub album: String,
    pub name: String,
}

impl Card {
    pub fn new(song: &Song) -> Self {
        Self {
            artist: song.artist.clone(),
            album: song.album.clone(),
            name: song.name.clone(),
            ..Default::default()
        }
    }
}

/// Cut `value` to `keep` characters plus `...` once it exceeds `limit` characters.
pub fn truncate(value: &str, limit: usize, keep: usize) -> String {
    if value.chars().count() > limit {
        format!("{}...", value.chars().take(keep).collect::<String>())
    } else {
        value.to_string()
    }
}

pub fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Shrink cover art and re-encode it as JPEG.
///
/// Bytes that do not decode as an image are returned unchanged.
pub fn cover_jpeg(bytes: &[u8]) -> Vec<u8> {
    let Ok(image) = image::load_from_memory(bytes) else {
        log::debug!("cover art did not decode; embedding it as is");
        return bytes.to_vec();
    };

    let mut out = Cursor::new(Vec::new());
    match image
        .thumbnail(COVER_SIZE, COVER_SIZE)
        .to_rgb8()
        .write_to(&mut out, ImageOutputFormat::Jpeg(90))
    {
        Ok(()) => out.into_inner(),
        Err(err) => {
            log::debug!("failed to encode cover art: {err}");
            bytes.to_vec()
        }
    }
}
