//! Article auto-publishing: draft generation, SEO passes and the daily job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::queue::JobHandler;
use crate::rate_limit::RateLimiter;
use crate::seo::{self, HeadingStructure, KeywordDensity, MetaTags, Readability, RelatedLink};
use crate::snapshot;
use crate::writer::ArticleWriter;
use transcargo_core::{Error, Result};
use transcargo_privacy::notify::deliver;
use transcargo_privacy::{AuditTrail, Notification, Notifier, RequestContext};
use transcargo_store::{
    new_seo_metadata, ArticlePatch, ArticleStatus, Cache, Country, NewArticle, SeoEntityType,
    SqliteStore,
};

pub const GENERATE_ARTICLE: &str = "generate_article";
pub const OPTIMIZE_ARTICLE_SEO: &str = "optimize_article_seo";
pub const GENERATE_DAILY_ARTICLE: &str = "generate_daily_article";
pub const NOTIFY_NEW_LEAD: &str = "notify_admins_new_lead";
pub const NOTIFY_NEW_ARTICLE_DRAFT: &str = "notify_admins_new_article_draft";

/// Audit actor for everything the pipeline does.
pub const AUTO_PUBLISH_ACTOR: &str = "system:auto-publish";

const SYSTEM_PROMPT: &str = "Ты опытный SEO-копирайтер в сфере логистики.";
const COMPETITOR_PLACEHOLDER: &str = "конкурент";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleType {
    CountryOverview,
    RouteGuide,
    CustomsGuide,
}

impl ArticleType {
    /// Unknown names get the overview prompt.
    pub fn parse(s: &str) -> Self {
        match s {
            "route_guide" => ArticleType::RouteGuide,
            "customs_guide" => ArticleType::CustomsGuide,
            _ => ArticleType::CountryOverview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleType::CountryOverview => "country_overview",
            ArticleType::RouteGuide => "route_guide",
            ArticleType::CustomsGuide => "customs_guide",
        }
    }
}

pub fn build_prompt(kind: ArticleType, country: &str, keywords: &[String], blacklist: &[String]) -> String {
    let keywords = keywords.join(", ");
    let banned = blacklist.join(", ");
    match kind {
        ArticleType::CountryOverview => format!(
            "Напиши SEO-статью об услугах грузоперевозок из страны {country} в Россию.\n\
             Требования:\n\
             - объём 2500-3000 слов;\n\
             - ключевые слова, естественно вписанные в текст: {keywords};\n\
             - структура: один H1, несколько H2 с подразделами H3;\n\
             - раскрой виды транспорта, сроки доставки, таможню и стоимость;\n\
             - профессиональный и понятный тон, призыв к действию в конце.\n\
             Избегай переспама ключевых слов, шаблонных фраз и воды.\n\
             Не упоминай конкурентов: {banned}."
        ),
        ArticleType::RouteGuide => format!(
            "Составь подробный гид по маршруту доставки грузов из страны {country} в Россию.\n\
             Опиши пункты отправления и прибытия, транзит, сроки, риски и рекомендации.\n\
             Структура: H1, затем H2/H3 для каждого этапа маршрута.\n\
             Ключевые слова: {keywords}.\n\
             Не упоминай конкурентов: {banned}."
        ),
        ArticleType::CustomsGuide => format!(
            "Напиши руководство по таможенному оформлению импорта из страны {country} в Россию.\n\
             Опиши документы, пошлины, льготы, типичные ошибки и сроки.\n\
             Структура: H1, разделы H2/H3, чек-листы.\n\
             Ключевые слова: {keywords}.\n\
             Не упоминай конкурентов: {banned}."
        ),
    }
}

/// Replace every blacklisted name with a neutral placeholder.
pub fn scrub_competitors(text: &str, blacklist: &[String]) -> String {
    blacklist
        .iter()
        .filter(|name| !name.is_empty())
        .fold(text.to_string(), |acc, name| acc.replace(name.as_str(), COMPETITOR_PLACEHOLDER))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoReport {
    pub density: KeywordDensity,
    pub readability: Readability,
    pub structure: HeadingStructure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSeo {
    pub meta: MetaTags,
    #[serde(flatten)]
    pub report: SeoReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArticle {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub seo: GeneratedSeo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedArticle {
    pub id: String,
    pub slug: String,
    pub seo: SeoReport,
}

#[derive(Deserialize)]
struct GenerateArgs {
    country_code: String,
    #[serde(default = "overview")]
    article_type: String,
}

fn overview() -> String {
    ArticleType::CountryOverview.as_str().to_string()
}

#[derive(Deserialize)]
struct OptimizeArgs {
    article_id: String,
}

pub struct ArticlePipeline {
    store: Arc<SqliteStore>,
    cache: Arc<dyn Cache>,
    audit: AuditTrail,
    writer: Arc<dyn ArticleWriter>,
    limiter: Arc<dyn RateLimiter>,
    notifier: Arc<dyn Notifier>,
    blacklist: Vec<String>,
}

impl ArticlePipeline {
    pub fn new(
        store: Arc<SqliteStore>,
        cache: Arc<dyn Cache>,
        writer: Arc<dyn ArticleWriter>,
        limiter: Arc<dyn RateLimiter>,
        notifier: Arc<dyn Notifier>,
        blacklist: Vec<String>,
    ) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            cache,
            writer,
            limiter,
            notifier,
            blacklist,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::system(AUTO_PUBLISH_ACTOR)
    }

    /// Country keywords merged with the global list, deduplicated in order.
    fn keywords_for(&self, country: &Country) -> Vec<String> {
        let global = snapshot::load_settings(self.cache.as_ref()).keywords;
        let mut keywords: Vec<String> = Vec::new();
        for k in country.seo_keywords().into_iter().chain(global) {
            let k = k.trim().to_string();
            if !k.is_empty() && !keywords.contains(&k) {
                keywords.push(k);
            }
        }
        if keywords.is_empty() {
            keywords = vec![
                format!("грузоперевозки {}", country.name_ru),
                "логистика".to_string(),
                "импорт".to_string(),
            ];
        }
        keywords
    }

    /// Draft one article for an active country and save it for review.
    pub async fn generate_article(&self, country_code: &str, article_type: &str) -> Result<GeneratedArticle> {
        let code = country_code.trim().to_uppercase();
        let country = self
            .store
            .read(|tx| tx.get_country_by_code(&code))?
            .filter(|c| c.is_active)
            .ok_or_else(|| Error::NotFound(format!("active country {}", code)))?;

        let keywords = self.keywords_for(&country);
        let prompt = build_prompt(
            ArticleType::parse(article_type),
            &country.name_ru,
            &keywords,
            &self.blacklist,
        );
        let ctx = Self::ctx();
        self.audit.record(
            &ctx,
            "ai_generate_article:prompt",
            "article",
            None,
            json!({
                "country": country.name_ru,
                "article_type": article_type,
                "prompt": prompt,
                "keywords": keywords,
            }),
        );

        self.limiter.acquire().await?;
        let draft = self.writer.write(SYSTEM_PROMPT, &prompt).await?;

        let content = scrub_competitors(&draft.content, &self.blacklist);
        let mut title = seo::first_line(&content, 120);
        if title.is_empty() {
            title = format!("Грузоперевозки из {}: обзор", country.name_ru);
        }
        self.audit.record(
            &ctx,
            "ai_generate_article:response",
            "article",
            None,
            json!({
                "title": title,
                "length": content.chars().count(),
                "model": draft.model,
                "keywords": keywords,
            }),
        );

        let report = SeoReport {
            density: seo::keyword_density(&content, &keywords),
            readability: seo::readability(&content),
            structure: seo::heading_structure(&content),
        };
        let meta = seo::meta_tags(&content, &keywords);
        let schema = seo::schema_markup(&title, &seo::outline(&content), &keywords, None);
        let base_slug = seo::slugify(&title);

        let article = self.store.write(|tx| {
            let mut slug = base_slug.clone();
            let mut n = 1;
            while tx.article_slug_exists(&slug)? {
                n += 1;
                slug = format!("{}-{}", base_slug, n);
            }
            let article = tx.insert_article(&NewArticle {
                slug: slug.clone(),
                title: title.clone(),
                content: content.clone(),
                seo_title: Some(meta.title.clone()),
                seo_description: Some(meta.description.clone()),
                seo_keywords: keywords.clone(),
                status: ArticleStatus::Draft,
                country_id: Some(country.id.clone()),
                auto_generated: true,
            })?;
            tx.upsert_seo_metadata(&new_seo_metadata(
                SeoEntityType::Article,
                &article.id,
                format!("/articles/{}", slug),
                non_empty_or(&meta.title, seo::take_chars(&title, 255)),
                non_empty_or(&meta.description, seo::take_chars(&content, 512)),
                keywords.clone(),
                schema,
            ))?;
            Ok(article)
        })?;

        let notification = Notification::NewArticleDraft {
            article_id: article.id.clone(),
            slug: article.slug.clone(),
            title: article.title.clone(),
        };
        if let Err(e) = self.notifier.notify(notification) {
            warn!("Draft {} notification failed: {}", article.id, e);
        }

        self.audit.record(
            &ctx,
            "article_auto_generated",
            "article",
            Some(&article.id),
            json!({
                "country_code": code,
                "article_type": article_type,
                "slug": article.slug,
                "density": report.density,
                "readability": report.readability,
                "structure": report.structure,
            }),
        );
        info!("Generated draft article {} ({}) for {}", article.id, article.slug, code);

        let result = GeneratedArticle {
            id: article.id,
            slug: article.slug,
            title: article.title,
            keywords,
            seo: GeneratedSeo { meta, report },
        };
        snapshot::push_queue_entry(
            self.cache.as_ref(),
            json!({
                "task": GENERATE_ARTICLE,
                "country_code": code,
                "article_type": article_type,
                "article": result,
                "ts": Utc::now().to_rfc3339(),
            }),
        );
        Ok(result)
    }

    /// Re-run the SEO analysis, link related published articles from the same
    /// country, and refresh the stored metadata.
    pub fn optimize_article_seo(&self, article_id: &str) -> Result<OptimizedArticle> {
        let (article, report) = self.store.write(|tx| {
            let article = tx
                .get_article(article_id)?
                .ok_or_else(|| Error::NotFound(format!("article {}", article_id)))?;

            let related: Vec<RelatedLink> = match &article.country_id {
                Some(country_id) => tx
                    .list_articles(Some(ArticleStatus::Published), 100, 0)?
                    .into_iter()
                    .filter(|a| a.id != article.id && a.country_id.as_deref() == Some(country_id))
                    .map(|a| RelatedLink {
                        title: a.title,
                        url: format!("/articles/{}", a.slug),
                    })
                    .collect(),
                None => Vec::new(),
            };
            let content = seo::add_internal_links(&article.content, &related);
            let article = if content != article.content {
                tx.update_article(
                    &article.id,
                    &ArticlePatch {
                        content: Some(content),
                        ..Default::default()
                    },
                )?
                .ok_or_else(|| Error::NotFound(format!("article {}", article_id)))?
            } else {
                article
            };

            let report = SeoReport {
                density: seo::keyword_density(&article.content, &article.seo_keywords),
                readability: seo::readability(&article.content),
                structure: seo::heading_structure(&article.content),
            };
            let title = article
                .seo_title
                .clone()
                .unwrap_or_else(|| article.title.clone());
            let description = article
                .seo_description
                .clone()
                .unwrap_or_else(|| seo::take_chars(&article.content, 512).to_string());
            tx.upsert_seo_metadata(&new_seo_metadata(
                SeoEntityType::Article,
                &article.id,
                format!("/articles/{}", article.slug),
                seo::take_chars(&title, 255).to_string(),
                description,
                article.seo_keywords.clone(),
                seo::schema_markup(
                    &article.title,
                    &seo::outline(&article.content),
                    &article.seo_keywords,
                    article.published_at,
                ),
            ))?;
            Ok((article, report))
        })?;

        self.audit.record(
            &Self::ctx(),
            "article_seo_optimized",
            "article",
            Some(&article.id),
            json!({
                "density": report.density,
                "readability": report.readability,
                "structure": report.structure,
            }),
        );
        info!("Optimized SEO for article {}", article.id);

        Ok(OptimizedArticle {
            id: article.id,
            slug: article.slug,
            seo: report,
        })
    }

    /// Overview article for a random active country.
    pub async fn generate_daily_article(&self) -> Result<serde_json::Value> {
        let countries = self.store.read(|tx| tx.list_countries(true))?;
        let code = countries
            .choose(&mut rand::thread_rng())
            .map(|c| c.code.clone());
        let Some(code) = code else {
            warn!("No active countries found for daily generation");
            return Ok(json!({ "ok": false, "reason": "no_countries" }));
        };
        let article = self
            .generate_article(&code, ArticleType::CountryOverview.as_str())
            .await?;
        Ok(json!({ "ok": true, "article": article }))
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(name: &str, kwargs: &serde_json::Value) -> Result<T> {
    serde_json::from_value(kwargs.clone())
        .map_err(|e| Error::Validation(format!("invalid arguments for {}: {}", name, e)))
}

#[async_trait]
impl JobHandler for ArticlePipeline {
    async fn run(&self, name: &str, kwargs: &serde_json::Value) -> Result<serde_json::Value> {
        match name {
            GENERATE_ARTICLE => {
                let args: GenerateArgs = parse_args(name, kwargs)?;
                let article = self
                    .generate_article(&args.country_code, &args.article_type)
                    .await?;
                Ok(serde_json::to_value(article)?)
            }
            OPTIMIZE_ARTICLE_SEO => {
                let args: OptimizeArgs = parse_args(name, kwargs)?;
                Ok(serde_json::to_value(self.optimize_article_seo(&args.article_id)?)?)
            }
            GENERATE_DAILY_ARTICLE => self.generate_daily_article().await,
            NOTIFY_NEW_LEAD | NOTIFY_NEW_ARTICLE_DRAFT => {
                let notification: Notification = parse_args(name, kwargs)?;
                Ok(deliver(&notification))
            }
            other => Err(Error::Job(format!("unknown job: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Draft;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use transcargo_store::{AuditFilter, MemoryCache, NewCountry, SeoEntityType};

    struct CannedWriter {
        content: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArticleWriter for CannedWriter {
        async fn write(&self, system: &str, prompt: &str) -> Result<crate::writer::Draft> {
            assert_eq!(system, SYSTEM_PROMPT);
            self.prompts.lock().push(prompt.to_string());
            Ok(Draft {
                content: self.content.clone(),
                model: "gpt-4o-mini".into(),
            })
        }
    }

    struct Gate(AtomicBool);

    #[async_trait]
    impl RateLimiter for Gate {
        async fn acquire(&self) -> Result<()> {
            if self.0.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(Error::RateLimited("closed".into()))
            }
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<Notification>>);

    impl Notifier for Inbox {
        fn notify(&self, notification: Notification) -> Result<()> {
            self.0.lock().push(notification);
            Ok(())
        }
    }

    struct Fixture {
        pipeline: ArticlePipeline,
        store: Arc<SqliteStore>,
        cache: Arc<MemoryCache>,
        writer: Arc<CannedWriter>,
        gate: Arc<Gate>,
        inbox: Arc<Inbox>,
        _dir: TempDir,
    }

    const DRAFT: &str = "# Доставка грузов из Китая от DHL и UPS\n\n\
        ## Авто\nгрузоперевозки Китай логистика.\n### Сроки\nТекст.\n## Море\nимпорт.";

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path()).unwrap());
        store
            .write(|tx| {
                tx.insert_country(&NewCountry {
                    code: "cn".into(),
                    name_ru: "Китай".into(),
                    name_en: "China".into(),
                    flag_emoji: None,
                    is_active: true,
                    seo_data: json!({"keywords": ["доставка из Китая", "логистика"]}),
                })
            })
            .unwrap();
        let cache = Arc::new(MemoryCache::default());
        let writer = Arc::new(CannedWriter {
            content: DRAFT.to_string(),
            prompts: Mutex::new(Vec::new()),
        });
        let gate = Arc::new(Gate(AtomicBool::new(true)));
        let inbox = Arc::new(Inbox::default());
        let pipeline = ArticlePipeline::new(
            store.clone(),
            cache.clone(),
            writer.clone(),
            gate.clone(),
            inbox.clone(),
            vec!["DHL".into(), "UPS".into()],
        );
        Fixture {
            pipeline,
            store,
            cache,
            writer,
            gate,
            inbox,
            _dir: dir,
        }
    }

    fn actions(store: &Arc<SqliteStore>) -> Vec<String> {
        let (entries, _) = store
            .read(|tx| {
                tx.query_audit(&AuditFilter {
                    size: 200,
                    ..Default::default()
                })
            })
            .unwrap();
        entries.into_iter().map(|e| e.action).collect()
    }

    #[test]
    fn test_article_type_parse() {
        assert_eq!(ArticleType::parse("route_guide"), ArticleType::RouteGuide);
        assert_eq!(ArticleType::parse("customs_guide"), ArticleType::CustomsGuide);
        assert_eq!(ArticleType::parse("whatever"), ArticleType::CountryOverview);
        let prompt = build_prompt(
            ArticleType::CustomsGuide,
            "Китай",
            &["a".into(), "b".into()],
            &["DHL".into()],
        );
        assert!(prompt.contains("таможенному"));
        assert!(prompt.contains("a, b"));
        assert!(prompt.contains("DHL"));
    }

    #[test]
    fn test_scrub_competitors() {
        let text = scrub_competitors("Везём быстрее, чем DHL и ПЭК", &["DHL".into(), "ПЭК".into(), "".into()]);
        assert_eq!(text, "Везём быстрее, чем конкурент и конкурент");
    }

    #[tokio::test]
    async fn test_generate_article_saves_draft() {
        let f = fixture();
        snapshot::update_settings(f.cache.as_ref(), Some(vec!["импорт".into(), "логистика".into()])).unwrap();

        let generated = f.pipeline.generate_article("cn", "country_overview").await.unwrap();
        assert_eq!(generated.title, "Доставка грузов из Китая от конкурент и конкурент");
        assert_eq!(generated.slug, "доставка-грузов-из-китая-от-конкурент-и-конкурент");
        assert_eq!(generated.keywords, vec!["доставка из Китая", "логистика", "импорт"]);
        assert!(generated.seo.report.structure.ok);

        let article = f
            .store
            .read(|tx| tx.get_article(&generated.id))
            .unwrap()
            .unwrap();
        assert_eq!(article.status, ArticleStatus::Draft);
        assert!(article.auto_generated);
        assert!(!article.content.contains("DHL"));
        assert!(article.country_id.is_some());

        let meta = f
            .store
            .read(|tx| tx.get_seo_metadata(SeoEntityType::Article, &generated.id))
            .unwrap()
            .unwrap();
        assert_eq!(meta.path, format!("/articles/{}", generated.slug));
        assert_eq!(meta.schema_markup["articleSection"], json!(["Авто", "Море"]));

        assert_eq!(f.inbox.0.lock().len(), 1);
        assert!(f.writer.prompts.lock()[0].contains("Китай"));

        let acts = actions(&f.store);
        for expected in [
            "ai_generate_article:prompt",
            "ai_generate_article:response",
            "article_auto_generated",
        ] {
            assert!(acts.iter().any(|a| a == expected), "missing {}", expected);
        }

        let queue = snapshot::queue_entries(f.cache.as_ref());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0]["article"]["id"], json!(generated.id));
    }

    #[tokio::test]
    async fn test_slugs_stay_unique() {
        let f = fixture();
        let a = f.pipeline.generate_article("CN", "route_guide").await.unwrap();
        let b = f.pipeline.generate_article("CN", "route_guide").await.unwrap();
        let c = f.pipeline.generate_article("CN", "route_guide").await.unwrap();
        assert_eq!(b.slug, format!("{}-2", a.slug));
        assert_eq!(c.slug, format!("{}-3", a.slug));
    }

    #[tokio::test]
    async fn test_rate_limit_stops_before_writing() {
        let f = fixture();
        f.gate.0.store(false, Ordering::SeqCst);
        let err = f.pipeline.generate_article("CN", "country_overview").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.writer.prompts.lock().is_empty());
        assert!(f
            .store
            .read(|tx| tx.list_articles(None, 10, 0))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_inactive_country() {
        let f = fixture();
        let err = f.pipeline.generate_article("XX", "country_overview").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_optimize_links_related_articles() {
        let f = fixture();
        let first = f.pipeline.generate_article("CN", "country_overview").await.unwrap();
        let second = f.pipeline.generate_article("CN", "route_guide").await.unwrap();
        f.store
            .write(|tx| {
                tx.update_article(
                    &first.id,
                    &ArticlePatch {
                        status: Some(ArticleStatus::Published),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let optimized = f.pipeline.optimize_article_seo(&second.id).unwrap();
        assert_eq!(optimized.slug, second.slug);
        let article = f
            .store
            .read(|tx| tx.get_article(&second.id))
            .unwrap()
            .unwrap();
        assert!(article
            .content
            .contains(&format!("— /articles/{}", first.slug)));
        assert!(actions(&f.store).iter().any(|a| a == "article_seo_optimized"));

        // A second pass does not stack another links block.
        f.pipeline.optimize_article_seo(&second.id).unwrap();
        let again = f
            .store
            .read(|tx| tx.get_article(&second.id))
            .unwrap()
            .unwrap();
        assert_eq!(again.content, article.content);

        assert!(matches!(
            f.pipeline.optimize_article_seo("missing"),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_daily_article_and_dispatch() {
        let f = fixture();
        let daily = f
            .pipeline
            .run(GENERATE_DAILY_ARTICLE, &json!({}))
            .await
            .unwrap();
        assert_eq!(daily["ok"], true);
        assert!(daily["article"]["slug"].is_string());

        let notified = f
            .pipeline
            .run(
                NOTIFY_NEW_LEAD,
                &serde_json::to_value(Notification::NewLead {
                    lead_id: "l1".into(),
                    status: "new".into(),
                    source: "contact_form".into(),
                    created_at: Utc::now(),
                })
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(notified["lead_id"], "l1");

        assert!(matches!(
            f.pipeline.run("generate_article", &json!({})).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            f.pipeline.run("reindex", &json!({})).await,
            Err(Error::Job(_))
        ));
    }

    #[tokio::test]
    async fn test_daily_article_without_countries() {
        let f = fixture();
        let id = f
            .store
            .read(|tx| tx.get_country_by_code("CN"))
            .unwrap()
            .unwrap()
            .id;
        f.store.write(|tx| tx.delete_country(&id)).unwrap();
        let out = f.pipeline.generate_daily_article().await.unwrap();
        assert_eq!(out, json!({"ok": false, "reason": "no_countries"}));
    }
}
