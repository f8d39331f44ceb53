//! HTML extraction for the genre index and the per-category top 50 lists.
//!
//! Expected list markup, one block per movie:
//!
//! ```text
//! <div class="lister-item-content">
//!   <h3 class="lister-item-header">
//!     <span class="lister-item-index">1.</span>
//!     <a href="/title/tt0111161/">Title</a>
//!     <span class="lister-item-year">(1994)</span>
//!   </h3>
//!   <p><span class="certificate">R</span> <span class="runtime">142 min</span>
//!      <span class="genre">Drama, Crime</span></p>
//!   <div class="ratings-bar"><div class="ratings-imdb-rating" data-value="9.3">..</div>
//!      <span class="metascore">82</span></div>
//!   <p>Summary text</p>
//!   <p>Director: <a>..</a> <span>|</span> Stars: <a>..</a>, <a>..</a></p>
//!   <p><span name="nv" data-value="2800000">..</span> <span name="nv" data-value="28,341,469">..</span></p>
//! </div>
//! ```

use chrono::NaiveDateTime;
use common::model::RawMovieRecord;
use common::raw_file::format_timestamp;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

use crate::CollectError;

/// One top 50 list linked from the genre index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub label: String,
    pub url: String,
}

fn selector(page: &str, css: &str) -> Result<Selector, CollectError> {
    Selector::parse(css)
        .map_err(|e| CollectError::markup(page, format!("invalid selector {}: {:?}", css, e)))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope.select(sel).next().map(|e| text_of(e).trim().to_string())
}

fn sorted_list(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}

/// Category labels and absolute list URLs, in page order. Links come from
/// the block right after the `slot_right-4` anchor.
pub fn parse_category_links(html: &str, base: &Url) -> Result<Vec<Category>, CollectError> {
    let page = base.as_str();
    let document = Html::parse_document(html);
    let container_sel = selector(page, "a[name=slot_right-4] + div")?;
    let link_sel = selector(page, "a[href]")?;

    let container = document
        .select(&container_sel)
        .next()
        .ok_or_else(|| CollectError::markup(page, "category link block not found"))?;

    let mut categories: Vec<Category> = Vec::new();
    for link in container.select(&link_sel) {
        let label = text_of(link).trim().to_string();
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if label.is_empty() || categories.iter().any(|c| c.label == label) {
            continue;
        }
        let url = base
            .join(href)
            .map_err(|e| CollectError::markup(page, format!("bad category link {}: {}", href, e)))?;
        categories.push(Category {
            label,
            url: url.to_string(),
        });
    }
    Ok(categories)
}

struct ListSelectors {
    item: Selector,
    header: Selector,
    link: Selector,
    index: Selector,
    year: Selector,
    certificate: Selector,
    runtime: Selector,
    genre: Selector,
    votes: Selector,
    paragraph: Selector,
    summary: Selector,
    imdb_rating: Selector,
    metascore: Selector,
}

impl ListSelectors {
    fn new(page: &str) -> Result<Self, CollectError> {
        Ok(Self {
            item: selector(page, "div .lister-item-content")?,
            header: selector(page, "h3.lister-item-header")?,
            link: selector(page, "a")?,
            index: selector(page, "span.lister-item-index")?,
            year: selector(page, "span.lister-item-year")?,
            certificate: selector(page, "span.certificate")?,
            runtime: selector(page, "span.runtime")?,
            genre: selector(page, "span.genre")?,
            votes: selector(page, "span[name=nv]")?,
            paragraph: selector(page, "p")?,
            summary: selector(page, "div.ratings-bar + p")?,
            imdb_rating: selector(page, "div.ratings-imdb-rating")?,
            metascore: selector(page, "span.metascore")?,
        })
    }
}

/// Directors are the paragraph's links before the separator span, actors
/// the links after it.
fn credits(paragraph: ElementRef<'_>) -> (Vec<String>, Vec<String>) {
    let mut directors = Vec::new();
    let mut actors = Vec::new();
    let mut past_separator = false;
    for child in paragraph.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "span" => past_separator = true,
            "a" if past_separator => actors.push(text_of(child)),
            "a" => directors.push(text_of(child)),
            _ => {}
        }
    }
    let mut directors = sorted_list(directors);
    directors.dedup();
    (directors, sorted_list(actors))
}

/// Every movie block on one category page, tagged with `category` and the
/// shared capture `timestamp`.
pub fn parse_movie_list(
    html: &str,
    category: &str,
    timestamp: NaiveDateTime,
) -> Result<Vec<RawMovieRecord>, CollectError> {
    let sel = ListSelectors::new(category)?;
    let document = Html::parse_document(html);
    let timestamp = format_timestamp(timestamp);
    let missing = |what: &str, position: usize| {
        CollectError::markup(category, format!("movie #{} has no {}", position + 1, what))
    };

    let mut records = Vec::new();
    for (position, item) in document.select(&sel.item).enumerate() {
        let header = item
            .select(&sel.header)
            .next()
            .ok_or_else(|| missing("header", position))?;
        let link = header
            .select(&sel.link)
            .next()
            .ok_or_else(|| missing("title link", position))?;
        let url = link
            .value()
            .attr("href")
            .ok_or_else(|| missing("title href", position))?
            .to_string();
        let rank = first_text(header, &sel.index)
            .ok_or_else(|| missing("rank", position))?
            .replace('.', "");
        let release_year = header
            .select(&sel.year)
            .next()
            .map(text_of)
            .ok_or_else(|| missing("release year", position))?;
        let summary = first_text(item, &sel.summary).ok_or_else(|| missing("summary", position))?;

        let genres = first_text(item, &sel.genre)
            .map(|g| sorted_list(g.split(", ").map(str::to_string).collect()));

        let mut votes = item.select(&sel.votes).filter_map(|e| e.value().attr("data-value"));
        let num_votes = votes.next().map(str::to_string);
        let gross_earnings = votes.next().map(str::to_string);

        let credit_paragraph = item
            .select(&sel.paragraph)
            .find(|p| text_of(*p).contains("Director"));
        let (directors, actors) = match credit_paragraph.map(credits) {
            Some((directors, actors)) => (Some(directors), Some(actors)),
            None => (None, None),
        };

        records.push(RawMovieRecord {
            title: text_of(link),
            url,
            category: category.to_string(),
            rank,
            release_year,
            mpaa_rating: first_text(item, &sel.certificate).filter(|c| !c.is_empty()),
            runtime: first_text(item, &sel.runtime),
            genres,
            imdb_rating: item
                .select(&sel.imdb_rating)
                .next()
                .and_then(|e| e.value().attr("data-value"))
                .map(str::to_string),
            metascore_rating: first_text(item, &sel.metascore),
            actors,
            directors,
            summary,
            num_votes,
            gross_earnings,
            timestamp: timestamp.clone(),
        });
    }
    Ok(records)
}
