//! HTML fixtures shaped like saved ad-library pages.

use ads_downloader_core::{ContentTree, Rect};

pub const VIEWPORT: Rect = Rect::new(0.0, 0.0, 1280.0, 800.0);

/// One ad card; everything optional except the brand.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub brand: String,
    pub status: Option<String>,
    pub started: Option<String>,
    pub video: Option<String>,
    pub image: Option<String>,
    /// Top edge; cards are 300 units tall.
    pub top: u32,
}

impl Card {
    pub fn new(brand: &str, top: u32) -> Self {
        Self {
            brand: brand.to_string(),
            top,
            ..Self::default()
        }
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn started(mut self, date: &str) -> Self {
        self.started = Some(date.to_string());
        self
    }

    pub fn video(mut self, url: &str) -> Self {
        self.video = Some(url.to_string());
        self
    }

    pub fn image(mut self, url: &str) -> Self {
        self.image = Some(url.to_string());
        self
    }

    pub fn html(&self) -> String {
        let top = self.top;
        let mut body = format!("<h3>{}</h3>", self.brand);
        if let Some(status) = &self.status {
            body.push_str(&format!("<span>{status}</span>"));
        }
        if let Some(date) = &self.started {
            body.push_str(&format!("<span>Started running on {date}</span>"));
        }
        if let Some(url) = &self.video {
            body.push_str(&format!(
                r#"<video src="{url}" data-rect="0,{top},400,200"></video>"#
            ));
        }
        if let Some(url) = &self.image {
            body.push_str(&format!(
                r#"<img src="{url}" alt="ad creative" data-rect="0,{top},400,200">"#
            ));
        }
        format!(
            r#"<div data-testid="ad_library_result" data-rect="0,{top},400,300">{body}</div>"#
        )
    }
}

pub fn page(cards: &[Card]) -> String {
    let body: String = cards.iter().map(Card::html).collect();
    format!("<html><body><main>{body}</main></body></html>")
}

pub fn tree(cards: &[Card]) -> ContentTree {
    ContentTree::from_html(&page(cards), VIEWPORT)
}

/// Five cards; exactly two carry a video.
pub fn five_cards(cdn: &str) -> Vec<Card> {
    vec![
        Card::new("Acme", 0)
            .status("Active")
            .started("Jun 10, 2024")
            .video(&format!("{cdn}/acme.mp4?tok=1")),
        Card::new("Globex", 320)
            .status("Inactive")
            .started("May 2, 2024")
            .image(&format!("{cdn}/globex.jpg")),
        Card::new("Initech", 640)
            .status("Active")
            .started("Jan 15, 2024")
            .video(&format!("{cdn}/initech.mp4"))
            .image(&format!("{cdn}/initech.jpg")),
        Card::new("Umbrella", 960)
            .started("Jun 1, 2024")
            .image(&format!("{cdn}/umbrella.png")),
        Card::new("Hooli", 1280)
            .status("Inactive")
            .image(&format!("{cdn}/hooli.webp?x=2")),
    ]
}
