use std::sync::OnceLock;

use anyhow::{Result, anyhow};
use regex::Regex;

use crate::markdown::count_images;

pub const COVER_PLACEHOLDER: &str = "{{IMAGE_1}}";
pub const BODY_PLACEHOLDER: &str = "{{IMAGE_2}}";
const COVER_LABEL: &str = "封面";
const BODY_LABEL: &str = "配图";
const MIN_POOL_SIZE: usize = 4;

const DEFAULT_POOL: [&str; 4] = [
    "https://images.unsplash.com/photo-1501004318641-b39e6451bec6?auto=format&fit=crop&w=1200&q=80",
    "https://images.unsplash.com/photo-1500530855697-b586d89ba3ee?auto=format&fit=crop&w=1200&q=80",
    "https://images.unsplash.com/photo-1506126613408-eca07ce68773?auto=format&fit=crop&w=1200&q=80",
    "https://images.unsplash.com/photo-1501785888041-af3ef285b470?auto=format&fit=crop&w=1200&q=80",
];

static LABELED_LINK_RE: OnceLock<Regex> = OnceLock::new();
static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn labeled_link_re() -> &'static Regex {
    LABELED_LINK_RE.get_or_init(|| {
        Regex::new(r"(?m)^(\s*)\[(封面|配图|图片|图)\]\(([^)]+)\)").expect("valid labeled link regex")
    })
}

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{\{IMAGE_\d+\}\}").expect("valid placeholder regex"))
}

/// Source of uniform floats in `[0, 1)`.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&mut self) -> f64 {
        rand::random::<f64>()
    }
}

fn random_index(rng: &mut dyn RandomSource, len: usize) -> usize {
    let r = rng.next_f64().clamp(0.0, 1.0);
    ((r * len as f64).floor() as usize).min(len.saturating_sub(1))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePool(Vec<String>);

impl Default for ImagePool {
    fn default() -> Self {
        Self(DEFAULT_POOL.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl ImagePool {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        let urls = urls
            .into_iter()
            .map(|u| u.trim().to_owned())
            .filter(|u| !u.is_empty())
            .collect::<Vec<_>>();
        if urls.len() < MIN_POOL_SIZE {
            return Err(anyhow!(
                "image pool needs at least {MIN_POOL_SIZE} urls, got {}",
                urls.len()
            ));
        }
        Ok(Self(urls))
    }

    pub fn urls(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePair {
    pub first: String,
    pub second: String,
}

/// Where the body image goes when the draft has no `{{IMAGE_2}}` marker and
/// no `## ` heading to anchor to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyImagePlacement {
    pub min_line: usize,
    pub line_span: usize,
}

impl Default for BodyImagePlacement {
    fn default() -> Self {
        Self {
            min_line: 6,
            line_span: 4,
        }
    }
}

/// Shuffles the pool and returns two distinct urls, `preferred` first when given.
pub fn pick_images(
    pool: &ImagePool,
    preferred: Option<&str>,
    rng: &mut dyn RandomSource,
) -> ImagePair {
    let mut shuffled = pool.urls().to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = random_index(rng, i + 1);
        shuffled.swap(i, j);
    }

    let preferred = preferred.map(str::trim).filter(|s| !s.is_empty());
    let mut unique: Vec<String> = Vec::with_capacity(shuffled.len() + 1);
    for url in preferred.map(str::to_owned).into_iter().chain(shuffled) {
        if !unique.contains(&url) {
            unique.push(url);
        }
    }

    let fallback = |idx: usize| pool.urls().get(idx).cloned().unwrap_or_default();
    let mut it = unique.into_iter();
    let first = it.next().unwrap_or_else(|| fallback(0));
    let second = it.next().unwrap_or_else(|| fallback(1));
    ImagePair { first, second }
}

fn image_tag(label: &str, url: &str) -> String {
    format!("![{label}]({url})")
}

/// Makes sure the draft carries a cover image and one body image.
///
/// Explicit `{{IMAGE_1}}` / `{{IMAGE_2}}` markers win. Without markers the
/// cover is prepended when the document has no image at all, and the body
/// image is dropped two lines below a random `## ` heading, or a few lines
/// into the document when there are no headings.
pub fn inject_images(
    markdown: &str,
    cover_url: Option<&str>,
    pool: &ImagePool,
    placement: BodyImagePlacement,
    rng: &mut dyn RandomSource,
) -> String {
    let ImagePair { first, second } = pick_images(pool, cover_url, rng);

    let mut output = labeled_link_re()
        .replace_all(markdown, "$1![$2]($3)")
        .into_owned();
    let image_count = count_images(&output);

    let cover_tag = image_tag(COVER_LABEL, &first);
    if output.contains(COVER_PLACEHOLDER) {
        output = output.replacen(COVER_PLACEHOLDER, &cover_tag, 1);
    } else if image_count == 0 {
        output = format!("{cover_tag}\n\n{output}");
    }

    let body_tag = image_tag(BODY_LABEL, &second);
    if output.contains(BODY_PLACEHOLDER) {
        output = output.replacen(BODY_PLACEHOLDER, &body_tag, 1);
    } else if image_count < 2 && !output.contains(&body_tag) {
        output = insert_body_image(&output, &body_tag, placement, rng);
    }

    // Duplicate or unknown markers have nothing left to resolve to.
    if placeholder_re().is_match(&output) {
        output = placeholder_re().replace_all(&output, "").into_owned();
    }

    output
}

fn insert_body_image(
    markdown: &str,
    body_tag: &str,
    placement: BodyImagePlacement,
    rng: &mut dyn RandomSource,
) -> String {
    let mut lines: Vec<&str> = markdown.split('\n').collect();
    let headings: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with("## "))
        .map(|(idx, _)| idx)
        .collect();

    let target = if headings.is_empty() {
        let offset = random_index(rng, placement.line_span.max(1));
        (placement.min_line + offset).min(lines.len())
    } else {
        headings[random_index(rng, headings.len())] + 2
    };
    let insert_at = target.min(lines.len());

    lines.splice(insert_at..insert_at, [body_tag, ""]);
    lines.join("\n")
}
