//! Built-in filters.

use crate::context::{FilterContext, FilterError};
use crate::registry::Filter;
use kiln_types::{Identifier, Value, ValueMap};
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, NoExpand, Regex};

/// Replace every match of `re`, propagating the first error out of the
/// replacement function. Unmet-dependency signals must escape the
/// filter intact.
fn replace_fallible(
    re: &Regex,
    input: &str,
    mut replace: impl FnMut(&Captures<'_>) -> Result<String, FilterError>,
) -> Result<String, FilterError> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let m = caps.get(0).ok_or_else(|| {
            FilterError::Message("regex match without capture 0".to_string())
        })?;
        out.push_str(&input[last..m.start()]);
        out.push_str(&replace(&caps)?);
        last = m.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Markdown to HTML via pulldown-cmark.
pub struct MarkdownFilter;

impl Filter for MarkdownFilter {
    fn name(&self) -> &str {
        "markdown"
    }

    fn apply(
        &self,
        content: &str,
        _args: &ValueMap,
        _ctx: &FilterContext<'_>,
    ) -> Result<String, FilterError> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);

        let parser = Parser::new_ext(content, options);
        let mut out = String::with_capacity(content.len() * 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }
}

static INCLUDE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\{\s*include\s+"([^"]+)"\s*\}\}"#).unwrap()
});
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*attr\s+([A-Za-z0-9_-]+)\s*\}\}").unwrap());

/// Expands `{{ include "/id/" }}` to another item's compiled content
/// and `{{ attr key }}` to an attribute of the current item.
pub struct EmbedFilter;

impl Filter for EmbedFilter {
    fn name(&self) -> &str {
        "embed"
    }

    fn apply(
        &self,
        content: &str,
        _args: &ValueMap,
        ctx: &FilterContext<'_>,
    ) -> Result<String, FilterError> {
        let expanded = replace_fallible(&INCLUDE_RE, content, |caps| {
            let identifier = Identifier::full(&caps[1]);
            ctx.compiled_content_of(&identifier)
        })?;
        replace_fallible(&ATTR_RE, &expanded, |caps| {
            Ok(ctx
                .item()
                .attribute(&caps[1])
                .as_ref()
                .map(Value::to_display_string)
                .unwrap_or_default())
        })
    }
}

static CONTENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*content\s*\}\}").unwrap());
static CONFIG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*config\s+([A-Za-z0-9_.-]+)\s*\}\}").unwrap());

/// Layout renderer: substitutes `{{ content }}`, `{{ attr key }}`, and
/// `{{ config key }}` into the layout body.
pub struct PlaceholderFilter;

impl Filter for PlaceholderFilter {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn apply(
        &self,
        content: &str,
        _args: &ValueMap,
        ctx: &FilterContext<'_>,
    ) -> Result<String, FilterError> {
        let inner = ctx.inner_content().unwrap_or(content);
        let layout_body = match ctx.layout() {
            Some(layout) => match layout.raw_text() {
                Some(text) => text.to_string(),
                None => {
                    return Err(FilterError::BinaryContent(layout.identifier().clone()))
                }
            },
            // Outside a layout application, behave as identity with
            // placeholder expansion over the content itself.
            None => content.to_string(),
        };

        // NoExpand: dollar signs in page content are literal text.
        let with_content = CONTENT_RE
            .replace_all(&layout_body, NoExpand(inner))
            .into_owned();
        let with_attrs = replace_fallible(&ATTR_RE, &with_content, |caps| {
            Ok(ctx
                .item()
                .attribute(&caps[1])
                .as_ref()
                .map(Value::to_display_string)
                .unwrap_or_default())
        })?;
        replace_fallible(&CONFIG_RE, &with_attrs, |caps| {
            Ok(ctx
                .config_value(&caps[1])
                .as_ref()
                .map(Value::to_display_string)
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{Content, Document, Item, Rep, RepKey, Site};
    use crate::rules::ActionSequence;
    use crate::tracker::DependencyTracker;
    use kiln_incremental::DependencyStore;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn item(id: &str, content: &str, attrs: ValueMap) -> Item {
        Item::new(Document::new(
            Identifier::full(id),
            Content::text(content),
            attrs,
        ))
    }

    struct Fixture {
        site: Site,
        config: Config,
        defaults: ValueMap,
        tracker: DependencyTracker,
        reps: HashMap<RepKey, Rep>,
    }

    impl Fixture {
        fn ctx<'a>(&'a self, id: &str) -> FilterContext<'a> {
            let item = self.site.item(&Identifier::full(id)).unwrap();
            FilterContext::new(
                &self.site,
                &self.config,
                &self.defaults,
                &self.tracker,
                &self.reps,
                item,
            )
        }
    }

    fn fixture() -> Fixture {
        let mut attrs = ValueMap::new();
        attrs.insert("title", "Alpha");
        let site = Site::new(
            vec![item("/a.md", "# hi", attrs), item("/b.md", "stuff", ValueMap::new())],
            vec![],
            vec![],
        )
        .unwrap();
        Fixture {
            site,
            config: Config::default(),
            defaults: ValueMap::new(),
            tracker: DependencyTracker::new(Arc::new(RwLock::new(DependencyStore::new()))),
            reps: HashMap::new(),
        }
    }

    #[test]
    fn test_markdown_renders_html() {
        let fx = fixture();
        let ctx = fx.ctx("/a.md");
        let out = MarkdownFilter
            .apply("# Title\n\nbody", &ValueMap::new(), &ctx)
            .unwrap();
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<p>body</p>"));
    }

    #[test]
    fn test_embed_expands_include_and_attr() {
        let mut fx = fixture();
        let key = RepKey::new(Identifier::full("/b.md"), "default");
        let mut rep = Rep::new(key.clone(), ActionSequence::default());
        rep.snapshots.insert("last".to_string(), Content::text("STUFF"));
        rep.compiled = true;
        fx.reps.insert(key, rep);

        let ctx = fx.ctx("/a.md");
        let out = EmbedFilter
            .apply(
                r#"before {{ include "/b.md" }} after, by {{ attr title }}"#,
                &ValueMap::new(),
                &ctx,
            )
            .unwrap();
        assert_eq!(out, "before STUFF after, by Alpha");
    }

    #[test]
    fn test_embed_propagates_unmet_dependency() {
        let fx = fixture();
        let ctx = fx.ctx("/a.md");
        let err = EmbedFilter
            .apply(r#"{{ include "/b.md" }}"#, &ValueMap::new(), &ctx)
            .unwrap_err();
        assert!(matches!(err, FilterError::UnmetDependency(_)));
    }

    #[test]
    fn test_placeholder_without_layout_expands_in_place() {
        let fx = fixture();
        let ctx = fx.ctx("/a.md");
        let out = PlaceholderFilter
            .apply("title: {{ attr title }}", &ValueMap::new(), &ctx)
            .unwrap();
        assert_eq!(out, "title: Alpha");
    }
}
