//! Paged list queries shared by every collection endpoint.
//!
//! A list is described by a [`ListQuery`] (projection, source and ordering) plus a
//! [`ListFilter`] that contributes `WHERE` predicates. [`fetch_page`] runs the same
//! predicates twice, once for the total count and once for the requested page, so
//! `totalCount` never depends on `page` or `pageSize`.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Encode, FromRow, QueryBuilder, Sqlite, SqlitePool, Type};

use crate::error::{AppError, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Raw `page` / `pageSize` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Validated, 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Result<Self> {
        if page < 1 {
            return Err(AppError::Validation(
                "page must be greater than or equal to 1".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::Validation(format!(
                "pageSize must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl TryFrom<PageParams> for PageRequest {
    type Error = AppError;

    fn try_from(params: PageParams) -> Result<Self> {
        Self::new(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

pub fn total_pages(total_count: i64, page_size: i64) -> i64 {
    if total_count <= 0 || page_size <= 0 {
        return 0;
    }
    (total_count + page_size - 1) / page_size
}

/// Paging fields of the list envelope, flattened next to the item array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_count: i64,
    pub total_pages: i64,
    pub current_page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, request: PageRequest) -> Self {
        Self {
            items,
            meta: PageMeta {
                total_count,
                total_pages: total_pages(total_count, request.page_size),
                current_page: request.page,
                page_size: request.page_size,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// Accumulates `WHERE` predicates on a query, joining them with `AND`.
pub struct Predicates<'q, 'args> {
    builder: &'q mut QueryBuilder<'args, Sqlite>,
    empty: bool,
}

impl<'q, 'args> Predicates<'q, 'args> {
    pub fn new(builder: &'q mut QueryBuilder<'args, Sqlite>) -> Self {
        Self {
            builder,
            empty: true,
        }
    }

    /// Opens a new predicate and hands back the builder to write it into.
    pub fn and(&mut self) -> &mut QueryBuilder<'args, Sqlite> {
        self.builder
            .push(if self.empty { " WHERE " } else { " AND " });
        self.empty = false;
        self.builder
    }

    pub fn eq<T>(&mut self, column: &str, value: T)
    where
        T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
    {
        self.and().push(column).push(" = ").push_bind(value);
    }

    pub fn eq_opt<T>(&mut self, column: &str, value: Option<T>)
    where
        T: 'args + Encode<'args, Sqlite> + Send + Type<Sqlite>,
    {
        if let Some(value) = value {
            self.eq(column, value);
        }
    }

    /// Case-insensitive substring match of `term` against a `search_text` column
    /// written with [`search_text`]. Blank terms add nothing.
    pub fn search(&mut self, column: &str, term: Option<&str>) {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return;
        };

        self.and()
            .push("instr(")
            .push(column)
            .push(", ")
            .push_bind(term.to_lowercase())
            .push(") > 0");
    }
}

/// Lowercased copy of a row's searchable fields, one per line.
///
/// SQLite `lower()` folds ASCII only, so folding is done here with full Unicode
/// case mapping and stored alongside the row.
pub fn search_text(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| field.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n")
}

pub trait ListFilter {
    fn apply<'args>(&'args self, predicates: &mut Predicates<'_, 'args>);
}

/// The fixed parts of a list query.
pub struct ListQuery<'a> {
    /// `SELECT ...` projection producing the item row.
    pub select: &'a str,
    /// `FROM ...` clause including joins; shared by the count query.
    pub from: &'a str,
    pub order_by: &'a str,
}

pub async fn fetch_page<T, F>(
    pool: &SqlitePool,
    query: &ListQuery<'_>,
    filter: &F,
    request: PageRequest,
) -> Result<Page<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    F: ListFilter + Sync,
{
    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) ");
    count.push(query.from);
    filter.apply(&mut Predicates::new(&mut count));
    let total_count: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new(query.select);
    select.push(" ").push(query.from);
    filter.apply(&mut Predicates::new(&mut select));
    select
        .push(" ORDER BY ")
        .push(query.order_by)
        .push(" LIMIT ")
        .push_bind(request.page_size())
        .push(" OFFSET ")
        .push_bind(request.offset());

    let items = select.build_query_as::<T>().fetch_all(pool).await?;

    Ok(Page::new(items, total_count, request))
}
