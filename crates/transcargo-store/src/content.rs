//! Site content queries: countries, services, articles, case studies, SEO metadata.

use rusqlite::{params, params_from_iter, OptionalExtension};

use crate::sqlite::{db_err, enum_col, json_col, list_col, new_id, opt_ts_col, ts_col, StoreTx};
use crate::types::*;
use transcargo_core::time::{now, to_db};
use transcargo_core::{Error, Result};

/// Unique-constraint violations become validation errors naming the field.
fn conflict_err(field: &str) -> impl Fn(rusqlite::Error) -> Error + '_ {
    move |e| {
        if e.to_string().contains("UNIQUE constraint") {
            Error::Validation(format!("{} already exists", field))
        } else if e.to_string().contains("FOREIGN KEY constraint") {
            Error::Validation("referenced country does not exist".to_string())
        } else {
            db_err(e)
        }
    }
}

fn query_all<T>(
    stmt: &mut rusqlite::Statement<'_>,
    args: &[String],
    map: fn(&rusqlite::Row<'_>) -> T,
) -> Result<Vec<T>> {
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| Ok(map(row)))
        .map_err(db_err)?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}

impl StoreTx<'_> {
    // ---------------------------------------------------------------
    // Countries
    // ---------------------------------------------------------------

    pub fn insert_country(&self, input: &NewCountry) -> Result<Country> {
        let country = Country {
            id: new_id(),
            code: input.code.trim().to_uppercase(),
            name_ru: input.name_ru.clone(),
            name_en: input.name_en.clone(),
            flag_emoji: input.flag_emoji.clone(),
            is_active: input.is_active,
            seo_data: input.seo_data.clone(),
            created_at: now(),
        };
        self.tx
            .prepare_cached(
                "INSERT INTO countries (id, code, name_ru, name_en, flag_emoji, is_active, seo_data_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .map_err(db_err)?
            .execute(params![
                country.id,
                country.code,
                country.name_ru,
                country.name_en,
                country.flag_emoji,
                country.is_active,
                country.seo_data.to_string(),
                to_db(&country.created_at),
            ])
            .map_err(conflict_err("country code"))?;
        Ok(country)
    }

    pub fn get_country(&self, id: &str) -> Result<Option<Country>> {
        self.tx
            .prepare_cached("SELECT * FROM countries WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_country(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn get_country_by_code(&self, code: &str) -> Result<Option<Country>> {
        self.tx
            .prepare_cached("SELECT * FROM countries WHERE code = ?1")
            .map_err(db_err)?
            .query_row(params![code.trim().to_uppercase()], |row| Ok(row_to_country(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn list_countries(&self, active_only: bool) -> Result<Vec<Country>> {
        let sql = if active_only {
            "SELECT * FROM countries WHERE is_active = 1 ORDER BY name_ru"
        } else {
            "SELECT * FROM countries ORDER BY name_ru"
        };
        let mut stmt = self.tx.prepare_cached(sql).map_err(db_err)?;
        query_all(&mut stmt, &[], row_to_country)
    }

    pub fn update_country(&self, id: &str, patch: &CountryPatch) -> Result<Option<Country>> {
        let Some(mut country) = self.get_country(id)? else {
            return Ok(None);
        };
        if let Some(v) = &patch.name_ru {
            country.name_ru = v.clone();
        }
        if let Some(v) = &patch.name_en {
            country.name_en = v.clone();
        }
        if let Some(v) = &patch.flag_emoji {
            country.flag_emoji = Some(v.clone());
        }
        if let Some(v) = patch.is_active {
            country.is_active = v;
        }
        if let Some(v) = &patch.seo_data {
            country.seo_data = v.clone();
        }
        self.tx
            .prepare_cached(
                "UPDATE countries SET name_ru = ?2, name_en = ?3, flag_emoji = ?4, is_active = ?5, seo_data_json = ?6
                 WHERE id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                country.id,
                country.name_ru,
                country.name_en,
                country.flag_emoji,
                country.is_active,
                country.seo_data.to_string(),
            ])
            .map_err(db_err)?;
        Ok(Some(country))
    }

    pub fn delete_country(&self, id: &str) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM countries WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Services
    // ---------------------------------------------------------------

    pub fn insert_service(&self, input: &NewService) -> Result<Service> {
        let service = Service {
            id: new_id(),
            country_id: input.country_id.clone(),
            service_type: input.service_type,
            title_ru: input.title_ru.clone(),
            title_en: input.title_en.clone(),
            description: input.description.clone(),
            price_info: input.price_info.clone(),
            transit_time_days: input.transit_time_days,
            is_active: input.is_active,
            created_at: now(),
        };
        self.tx
            .prepare_cached(
                "INSERT INTO services (id, country_id, service_type, title_ru, title_en, description,
                    price_info_json, transit_time_days, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )
            .map_err(db_err)?
            .execute(params![
                service.id,
                service.country_id,
                service.service_type.as_str(),
                service.title_ru,
                service.title_en,
                service.description,
                service.price_info.to_string(),
                service.transit_time_days,
                service.is_active,
                to_db(&service.created_at),
            ])
            .map_err(conflict_err("service"))?;
        Ok(service)
    }

    pub fn get_service(&self, id: &str) -> Result<Option<Service>> {
        self.tx
            .prepare_cached("SELECT * FROM services WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_service(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn list_services(&self, country_id: Option<&str>, active_only: bool) -> Result<Vec<Service>> {
        let mut sql = String::from("SELECT * FROM services WHERE 1 = 1");
        let mut args = Vec::new();
        if let Some(c) = country_id {
            sql.push_str(" AND country_id = ?");
            args.push(c.to_string());
        }
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        sql.push_str(" ORDER BY created_at");
        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        query_all(&mut stmt, &args, row_to_service)
    }

    pub fn update_service(&self, id: &str, patch: &ServicePatch) -> Result<Option<Service>> {
        let Some(mut service) = self.get_service(id)? else {
            return Ok(None);
        };
        if let Some(v) = patch.service_type {
            service.service_type = v;
        }
        if let Some(v) = &patch.title_ru {
            service.title_ru = v.clone();
        }
        if let Some(v) = &patch.title_en {
            service.title_en = v.clone();
        }
        if let Some(v) = &patch.description {
            service.description = Some(v.clone());
        }
        if let Some(v) = &patch.price_info {
            service.price_info = v.clone();
        }
        if let Some(v) = patch.transit_time_days {
            service.transit_time_days = Some(v);
        }
        if let Some(v) = patch.is_active {
            service.is_active = v;
        }
        self.tx
            .prepare_cached(
                "UPDATE services SET service_type = ?2, title_ru = ?3, title_en = ?4, description = ?5,
                    price_info_json = ?6, transit_time_days = ?7, is_active = ?8
                 WHERE id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                service.id,
                service.service_type.as_str(),
                service.title_ru,
                service.title_en,
                service.description,
                service.price_info.to_string(),
                service.transit_time_days,
                service.is_active,
            ])
            .map_err(db_err)?;
        Ok(Some(service))
    }

    pub fn delete_service(&self, id: &str) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM services WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Articles
    // ---------------------------------------------------------------

    pub fn insert_article(&self, input: &NewArticle) -> Result<Article> {
        let ts = now();
        let article = Article {
            id: new_id(),
            slug: input.slug.clone(),
            title: input.title.clone(),
            content: input.content.clone(),
            seo_title: input.seo_title.clone(),
            seo_description: input.seo_description.clone(),
            seo_keywords: input.seo_keywords.clone(),
            status: input.status,
            country_id: input.country_id.clone(),
            auto_generated: input.auto_generated,
            views_count: 0,
            published_at: (input.status == ArticleStatus::Published).then_some(ts),
            created_at: ts,
            updated_at: ts,
        };
        self.tx
            .prepare_cached(
                "INSERT INTO articles (id, slug, title, content, seo_title, seo_description, seo_keywords_json,
                    status, country_id, auto_generated, views_count, published_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?11, ?12, ?12)",
            )
            .map_err(db_err)?
            .execute(params![
                article.id,
                article.slug,
                article.title,
                article.content,
                article.seo_title,
                article.seo_description,
                serde_json::to_string(&article.seo_keywords)?,
                article.status.as_str(),
                article.country_id,
                article.auto_generated,
                article.published_at.as_ref().map(to_db),
                to_db(&ts),
            ])
            .map_err(conflict_err("slug"))?;
        Ok(article)
    }

    pub fn get_article(&self, id: &str) -> Result<Option<Article>> {
        self.tx
            .prepare_cached("SELECT * FROM articles WHERE id = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_article(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        self.tx
            .prepare_cached("SELECT * FROM articles WHERE slug = ?1")
            .map_err(db_err)?
            .query_row(params![slug], |row| Ok(row_to_article(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn article_slug_exists(&self, slug: &str) -> Result<bool> {
        self.tx
            .prepare_cached("SELECT EXISTS(SELECT 1 FROM articles WHERE slug = ?1)")
            .map_err(db_err)?
            .query_row(params![slug], |row| row.get(0))
            .map_err(db_err)
    }

    /// Newest first.
    pub fn list_articles(
        &self,
        status: Option<ArticleStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Article>> {
        let mut sql = String::from("SELECT * FROM articles");
        let mut args = Vec::new();
        if let Some(s) = status {
            sql.push_str(" WHERE status = ?");
            args.push(s.as_str().to_string());
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {} OFFSET {}", limit, offset));
        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        query_all(&mut stmt, &args, row_to_article)
    }

    /// Publishing for the first time stamps `published_at`.
    pub fn update_article(&self, id: &str, patch: &ArticlePatch) -> Result<Option<Article>> {
        let Some(mut article) = self.get_article(id)? else {
            return Ok(None);
        };
        if let Some(v) = &patch.slug {
            article.slug = v.clone();
        }
        if let Some(v) = &patch.title {
            article.title = v.clone();
        }
        if let Some(v) = &patch.content {
            article.content = v.clone();
        }
        if let Some(v) = &patch.seo_title {
            article.seo_title = Some(v.clone());
        }
        if let Some(v) = &patch.seo_description {
            article.seo_description = Some(v.clone());
        }
        if let Some(v) = &patch.seo_keywords {
            article.seo_keywords = v.clone();
        }
        if let Some(v) = &patch.country_id {
            article.country_id = Some(v.clone());
        }
        article.updated_at = now();
        if let Some(status) = patch.status {
            if status == ArticleStatus::Published && article.published_at.is_none() {
                article.published_at = Some(article.updated_at);
            }
            article.status = status;
        }
        self.tx
            .prepare_cached(
                "UPDATE articles SET slug = ?2, title = ?3, content = ?4, seo_title = ?5, seo_description = ?6,
                    seo_keywords_json = ?7, status = ?8, country_id = ?9, published_at = ?10, updated_at = ?11
                 WHERE id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                article.id,
                article.slug,
                article.title,
                article.content,
                article.seo_title,
                article.seo_description,
                serde_json::to_string(&article.seo_keywords)?,
                article.status.as_str(),
                article.country_id,
                article.published_at.as_ref().map(to_db),
                to_db(&article.updated_at),
            ])
            .map_err(conflict_err("slug"))?;
        Ok(Some(article))
    }

    pub fn increment_article_views(&self, id: &str) -> Result<()> {
        self.tx
            .execute(
                "UPDATE articles SET views_count = views_count + 1 WHERE id = ?1",
                params![id],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_article(&self, id: &str) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM articles WHERE id = ?1", params![id])
            .map_err(db_err)?;
        if count > 0 {
            self.tx
                .execute(
                    "DELETE FROM seo_metadata WHERE entity_type = 'article' AND entity_id = ?1",
                    params![id],
                )
                .map_err(db_err)?;
        }
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // Case studies
    // ---------------------------------------------------------------

    pub fn insert_case_study(&self, input: &NewCaseStudy) -> Result<CaseStudy> {
        let ts = now();
        let case = CaseStudy {
            id: new_id(),
            slug: input.slug.clone(),
            title: input.title.clone(),
            content: input.content.clone(),
            client_name: input.client_name.clone(),
            cargo_type: input.cargo_type.clone(),
            delivery_time: input.delivery_time,
            images: input.images.clone(),
            status: input.status,
            country_id: input.country_id.clone(),
            created_at: ts,
            updated_at: ts,
        };
        self.tx
            .prepare_cached(
                "INSERT INTO case_studies (id, slug, title, content, client_name, cargo_type, delivery_time,
                    images_json, status, country_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            )
            .map_err(db_err)?
            .execute(params![
                case.id,
                case.slug,
                case.title,
                case.content,
                case.client_name,
                case.cargo_type,
                case.delivery_time,
                serde_json::to_string(&case.images)?,
                case.status.as_str(),
                case.country_id,
                to_db(&ts),
            ])
            .map_err(conflict_err("slug"))?;
        Ok(case)
    }

    pub fn get_case_study(&self, id: &str) -> Result<Option<CaseStudy>> {
        self.tx
            .prepare_cached("SELECT * FROM case_studies WHERE id = ?1 OR slug = ?1")
            .map_err(db_err)?
            .query_row(params![id], |row| Ok(row_to_case_study(row)))
            .optional()
            .map_err(db_err)
    }

    pub fn list_case_studies(&self, status: Option<CaseStudyStatus>) -> Result<Vec<CaseStudy>> {
        let mut sql = String::from("SELECT * FROM case_studies");
        let mut args = Vec::new();
        if let Some(s) = status {
            sql.push_str(" WHERE status = ?");
            args.push(s.as_str().to_string());
        }
        sql.push_str(" ORDER BY created_at DESC");
        let mut stmt = self.tx.prepare(&sql).map_err(db_err)?;
        query_all(&mut stmt, &args, row_to_case_study)
    }

    pub fn update_case_study(&self, id: &str, patch: &CaseStudyPatch) -> Result<Option<CaseStudy>> {
        let Some(mut case) = self.get_case_study(id)? else {
            return Ok(None);
        };
        if let Some(v) = &patch.slug {
            case.slug = v.clone();
        }
        if let Some(v) = &patch.title {
            case.title = v.clone();
        }
        if let Some(v) = &patch.content {
            case.content = v.clone();
        }
        if let Some(v) = &patch.client_name {
            case.client_name = Some(v.clone());
        }
        if let Some(v) = &patch.cargo_type {
            case.cargo_type = Some(v.clone());
        }
        if let Some(v) = patch.delivery_time {
            case.delivery_time = Some(v);
        }
        if let Some(v) = &patch.images {
            case.images = v.clone();
        }
        if let Some(v) = patch.status {
            case.status = v;
        }
        case.updated_at = now();
        self.tx
            .prepare_cached(
                "UPDATE case_studies SET slug = ?2, title = ?3, content = ?4, client_name = ?5, cargo_type = ?6,
                    delivery_time = ?7, images_json = ?8, status = ?9, updated_at = ?10
                 WHERE id = ?1",
            )
            .map_err(db_err)?
            .execute(params![
                case.id,
                case.slug,
                case.title,
                case.content,
                case.client_name,
                case.cargo_type,
                case.delivery_time,
                serde_json::to_string(&case.images)?,
                case.status.as_str(),
                to_db(&case.updated_at),
            ])
            .map_err(conflict_err("slug"))?;
        Ok(Some(case))
    }

    pub fn delete_case_study(&self, id: &str) -> Result<bool> {
        let count = self
            .tx
            .execute("DELETE FROM case_studies WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ---------------------------------------------------------------
    // SEO metadata
    // ---------------------------------------------------------------

    /// Insert or replace the metadata for (entity_type, entity_id).
    pub fn upsert_seo_metadata(&self, meta: &SeoMetadata) -> Result<SeoMetadata> {
        self.tx
            .prepare_cached(
                "INSERT INTO seo_metadata (id, entity_type, entity_id, path, title, description, keywords_json,
                    schema_markup_json, canonical_url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(entity_type, entity_id) DO UPDATE SET
                    path = excluded.path,
                    title = excluded.title,
                    description = excluded.description,
                    keywords_json = excluded.keywords_json,
                    schema_markup_json = excluded.schema_markup_json,
                    canonical_url = excluded.canonical_url,
                    updated_at = excluded.updated_at",
            )
            .map_err(db_err)?
            .execute(params![
                meta.id,
                meta.entity_type.as_str(),
                meta.entity_id,
                meta.path,
                meta.title,
                meta.description,
                serde_json::to_string(&meta.keywords)?,
                meta.schema_markup.to_string(),
                meta.canonical_url,
                to_db(&meta.updated_at),
            ])
            .map_err(db_err)?;
        self.get_seo_metadata(meta.entity_type, &meta.entity_id)?
            .ok_or_else(|| Error::Database("seo metadata vanished after upsert".into()))
    }

    pub fn get_seo_metadata(
        &self,
        entity_type: SeoEntityType,
        entity_id: &str,
    ) -> Result<Option<SeoMetadata>> {
        self.tx
            .prepare_cached("SELECT * FROM seo_metadata WHERE entity_type = ?1 AND entity_id = ?2")
            .map_err(db_err)?
            .query_row(params![entity_type.as_str(), entity_id], |row| {
                Ok(row_to_seo(row))
            })
            .optional()
            .map_err(db_err)
    }

    pub fn seo_metadata_by_path(&self, path: &str) -> Result<Option<SeoMetadata>> {
        self.tx
            .prepare_cached("SELECT * FROM seo_metadata WHERE path = ?1 LIMIT 1")
            .map_err(db_err)?
            .query_row(params![path], |row| Ok(row_to_seo(row)))
            .optional()
            .map_err(db_err)
    }
}

/// Builds a fresh metadata row; the id is replaced by the stored one on upsert.
pub fn new_seo_metadata(
    entity_type: SeoEntityType,
    entity_id: &str,
    path: String,
    title: String,
    description: String,
    keywords: Vec<String>,
    schema_markup: serde_json::Value,
) -> SeoMetadata {
    SeoMetadata {
        id: new_id(),
        entity_type,
        entity_id: entity_id.to_string(),
        path,
        title,
        description,
        keywords,
        schema_markup,
        canonical_url: None,
        updated_at: now(),
    }
}

fn row_to_country(row: &rusqlite::Row<'_>) -> Country {
    Country {
        id: row.get("id").unwrap_or_default(),
        code: row.get("code").unwrap_or_default(),
        name_ru: row.get("name_ru").unwrap_or_default(),
        name_en: row.get("name_en").unwrap_or_default(),
        flag_emoji: row.get("flag_emoji").ok().flatten(),
        is_active: row.get("is_active").unwrap_or(false),
        seo_data: json_col(row, "seo_data_json"),
        created_at: ts_col(row, "created_at"),
    }
}

fn row_to_service(row: &rusqlite::Row<'_>) -> Service {
    Service {
        id: row.get("id").unwrap_or_default(),
        country_id: row.get("country_id").unwrap_or_default(),
        service_type: enum_col(row, "service_type", ServiceType::Auto),
        title_ru: row.get("title_ru").unwrap_or_default(),
        title_en: row.get("title_en").unwrap_or_default(),
        description: row.get("description").ok().flatten(),
        price_info: json_col(row, "price_info_json"),
        transit_time_days: row.get("transit_time_days").ok().flatten(),
        is_active: row.get("is_active").unwrap_or(false),
        created_at: ts_col(row, "created_at"),
    }
}

fn row_to_article(row: &rusqlite::Row<'_>) -> Article {
    Article {
        id: row.get("id").unwrap_or_default(),
        slug: row.get("slug").unwrap_or_default(),
        title: row.get("title").unwrap_or_default(),
        content: row.get("content").unwrap_or_default(),
        seo_title: row.get("seo_title").ok().flatten(),
        seo_description: row.get("seo_description").ok().flatten(),
        seo_keywords: list_col(row, "seo_keywords_json"),
        status: enum_col(row, "status", ArticleStatus::Draft),
        country_id: row.get("country_id").ok().flatten(),
        auto_generated: row.get("auto_generated").unwrap_or(false),
        views_count: row.get("views_count").unwrap_or(0),
        published_at: opt_ts_col(row, "published_at"),
        created_at: ts_col(row, "created_at"),
        updated_at: ts_col(row, "updated_at"),
    }
}

fn row_to_case_study(row: &rusqlite::Row<'_>) -> CaseStudy {
    CaseStudy {
        id: row.get("id").unwrap_or_default(),
        slug: row.get("slug").unwrap_or_default(),
        title: row.get("title").unwrap_or_default(),
        content: row.get("content").unwrap_or_default(),
        client_name: row.get("client_name").ok().flatten(),
        cargo_type: row.get("cargo_type").ok().flatten(),
        delivery_time: row.get("delivery_time").ok().flatten(),
        images: list_col(row, "images_json"),
        status: enum_col(row, "status", CaseStudyStatus::Draft),
        country_id: row.get("country_id").unwrap_or_default(),
        created_at: ts_col(row, "created_at"),
        updated_at: ts_col(row, "updated_at"),
    }
}

fn row_to_seo(row: &rusqlite::Row<'_>) -> SeoMetadata {
    SeoMetadata {
        id: row.get("id").unwrap_or_default(),
        entity_type: enum_col(row, "entity_type", SeoEntityType::Article),
        entity_id: row.get("entity_id").unwrap_or_default(),
        path: row.get("path").unwrap_or_default(),
        title: row.get("title").unwrap_or_default(),
        description: row.get("description").unwrap_or_default(),
        keywords: list_col(row, "keywords_json"),
        schema_markup: json_col(row, "schema_markup_json"),
        canonical_url: row.get("canonical_url").ok().flatten(),
        updated_at: ts_col(row, "updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;
    use tempfile::TempDir;

    fn test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn china() -> NewCountry {
        NewCountry {
            code: "cn".into(),
            name_ru: "Китай".into(),
            name_en: "China".into(),
            flag_emoji: Some("🇨🇳".into()),
            is_active: true,
            seo_data: serde_json::json!({"keywords": ["доставка из Китая"]}),
        }
    }

    fn article(slug: &str) -> NewArticle {
        NewArticle {
            slug: slug.into(),
            title: "Доставка из Китая".into(),
            content: "# Доставка\n\nТекст".into(),
            seo_title: None,
            seo_description: None,
            seo_keywords: vec!["логистика".into()],
            status: ArticleStatus::Draft,
            country_id: None,
            auto_generated: false,
        }
    }

    #[test]
    fn test_country_code_normalized_and_unique() {
        let (store, _dir) = test_store();
        let c = store.write(|tx| tx.insert_country(&china())).unwrap();
        assert_eq!(c.code, "CN");
        let found = store.read(|tx| tx.get_country_by_code("cn")).unwrap().unwrap();
        assert_eq!(found.id, c.id);
        assert_eq!(found.seo_keywords(), vec!["доставка из Китая"]);

        let dup = store.write(|tx| tx.insert_country(&china()));
        assert!(matches!(dup, Err(Error::Validation(_))));
    }

    #[test]
    fn test_country_patch_and_active_listing() {
        let (store, _dir) = test_store();
        let c = store.write(|tx| tx.insert_country(&china())).unwrap();
        store
            .write(|tx| {
                tx.update_country(
                    &c.id,
                    &CountryPatch {
                        is_active: Some(false),
                        ..Default::default()
                    },
                )
            })
            .unwrap();
        assert!(store.read(|tx| tx.list_countries(true)).unwrap().is_empty());
        assert_eq!(store.read(|tx| tx.list_countries(false)).unwrap().len(), 1);
        assert!(store
            .write(|tx| tx.update_country("missing", &CountryPatch::default()))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_services_cascade_with_country() {
        let (store, _dir) = test_store();
        let c = store.write(|tx| tx.insert_country(&china())).unwrap();
        store
            .write(|tx| {
                tx.insert_service(&NewService {
                    country_id: c.id.clone(),
                    service_type: ServiceType::Railway,
                    title_ru: "ЖД".into(),
                    title_en: "Rail".into(),
                    description: None,
                    price_info: serde_json::json!({"from": 3500}),
                    transit_time_days: Some(25),
                    is_active: true,
                })
            })
            .unwrap();
        assert_eq!(store.read(|tx| tx.list_services(Some(&c.id), true)).unwrap().len(), 1);
        store.write(|tx| tx.delete_country(&c.id)).unwrap();
        assert!(store.read(|tx| tx.list_services(None, false)).unwrap().is_empty());
    }

    #[test]
    fn test_service_requires_existing_country() {
        let (store, _dir) = test_store();
        let result = store.write(|tx| {
            tx.insert_service(&NewService {
                country_id: "nope".into(),
                service_type: ServiceType::Air,
                title_ru: "Авиа".into(),
                title_en: "Air".into(),
                description: None,
                price_info: serde_json::json!({}),
                transit_time_days: None,
                is_active: true,
            })
        });
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_article_publish_stamps_once() {
        let (store, _dir) = test_store();
        let a = store.write(|tx| tx.insert_article(&article("dostavka"))).unwrap();
        assert!(a.published_at.is_none());
        assert!(store.read(|tx| tx.article_slug_exists("dostavka")).unwrap());

        let published = store
            .write(|tx| {
                tx.update_article(
                    &a.id,
                    &ArticlePatch {
                        status: Some(ArticleStatus::Published),
                        ..Default::default()
                    },
                )
            })
            .unwrap()
            .unwrap();
        let first_stamp = published.published_at.unwrap();

        let republished = store
            .write(|tx| {
                tx.update_article(
                    &a.id,
                    &ArticlePatch {
                        status: Some(ArticleStatus::Published),
                        title: Some("Новый заголовок".into()),
                        ..Default::default()
                    },
                )
            })
            .unwrap()
            .unwrap();
        assert_eq!(
            republished.published_at.unwrap().timestamp_micros(),
            first_stamp.timestamp_micros()
        );
        assert_eq!(republished.seo_keywords, vec!["логистика"]);
    }

    #[test]
    fn test_article_views_and_listing() {
        let (store, _dir) = test_store();
        let a = store.write(|tx| tx.insert_article(&article("one"))).unwrap();
        store.write(|tx| tx.insert_article(&article("two"))).unwrap();
        store.write(|tx| tx.increment_article_views(&a.id)).unwrap();
        let got = store.read(|tx| tx.get_article_by_slug("one")).unwrap().unwrap();
        assert_eq!(got.views_count, 1);
        let drafts = store
            .read(|tx| tx.list_articles(Some(ArticleStatus::Draft), 10, 0))
            .unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(store
            .read(|tx| tx.list_articles(Some(ArticleStatus::Published), 10, 0))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_case_study_lookup_by_slug() {
        let (store, _dir) = test_store();
        let c = store.write(|tx| tx.insert_country(&china())).unwrap();
        let case = store
            .write(|tx| {
                tx.insert_case_study(&NewCaseStudy {
                    slug: "oborudovanie".into(),
                    title: "Оборудование".into(),
                    content: "Кейс".into(),
                    client_name: None,
                    cargo_type: Some("станки".into()),
                    delivery_time: Some(30),
                    images: vec!["/img/1.jpg".into()],
                    status: CaseStudyStatus::Published,
                    country_id: c.id.clone(),
                })
            })
            .unwrap();
        let by_slug = store.read(|tx| tx.get_case_study("oborudovanie")).unwrap().unwrap();
        assert_eq!(by_slug.id, case.id);
        assert_eq!(by_slug.images, vec!["/img/1.jpg"]);
        assert_eq!(
            store
                .read(|tx| tx.list_case_studies(Some(CaseStudyStatus::Published)))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_seo_upsert_single_row_per_entity() {
        let (store, _dir) = test_store();
        let a = store.write(|tx| tx.insert_article(&article("seo"))).unwrap();
        let first = store
            .write(|tx| {
                tx.upsert_seo_metadata(&new_seo_metadata(
                    SeoEntityType::Article,
                    &a.id,
                    "/articles/seo".into(),
                    "T1".into(),
                    "D1".into(),
                    vec![],
                    serde_json::json!({}),
                ))
            })
            .unwrap();
        let second = store
            .write(|tx| {
                tx.upsert_seo_metadata(&new_seo_metadata(
                    SeoEntityType::Article,
                    &a.id,
                    "/articles/seo".into(),
                    "T2".into(),
                    "D2".into(),
                    vec!["k".into()],
                    serde_json::json!({"@type": "Article"}),
                ))
            })
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "T2");
        let by_path = store
            .read(|tx| tx.seo_metadata_by_path("/articles/seo"))
            .unwrap()
            .unwrap();
        assert_eq!(by_path.keywords, vec!["k"]);

        store.write(|tx| tx.delete_article(&a.id)).unwrap();
        assert!(store
            .read(|tx| tx.get_seo_metadata(SeoEntityType::Article, &a.id))
            .unwrap()
            .is_none());
    }
}
