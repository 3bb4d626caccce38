// src/models/query.rs
// List query types: pagination, category filter and sort.
// Parsing is lenient. Anything that does not parse falls back to a default
// instead of failing the request.

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

/// Allow-listed sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    Name,
    Price,
    Stock,
    Category,
    #[default]
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Unknown keys fall back to `CreatedAt`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("name") => Self::Name,
            Some("price") => Self::Price,
            Some("stock") => Self::Stock,
            Some("category") => Self::Category,
            Some("createdAt") => Self::CreatedAt,
            Some("updatedAt") => Self::UpdatedAt,
            _ => Self::default(),
        }
    }

    /// Key as it appears in JSON and in stored documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Price => "price",
            Self::Stock => "stock",
            Self::Category => "category",
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Only the exact string `desc` sorts descending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("desc") => Self::Desc,
            _ => Self::Asc,
        }
    }
}

/// A normalized list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductQuery {
    /// 1-indexed
    pub page: u64,
    pub limit: u64,
    pub category: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl ProductQuery {
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            category: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// Parse a positive integer query parameter, falling back to `default`.
pub fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(default)
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// `ceil(total / limit)`; zero matches means zero pages.
pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_calculation() {
        let mut q = ProductQuery::default();
        assert_eq!(q.offset(), 0);

        q.page = 2;
        assert_eq!(q.offset(), 10);

        q.page = 3;
        q.limit = 25;
        assert_eq!(q.offset(), 50);
    }

    #[test]
    fn malformed_numbers_fall_back() {
        assert_eq!(positive_or(None, 10), 10);
        assert_eq!(positive_or(Some("abc"), 10), 10);
        assert_eq!(positive_or(Some("0"), 10), 10);
        assert_eq!(positive_or(Some("-3"), 1), 1);
        assert_eq!(positive_or(Some("2.5"), 1), 1);
        assert_eq!(positive_or(Some(" 7 "), 1), 7);
    }

    #[test]
    fn unknown_sort_field_uses_created_at() {
        assert_eq!(SortField::parse(Some("price")), SortField::Price);
        assert_eq!(SortField::parse(Some("password")), SortField::CreatedAt);
        assert_eq!(SortField::parse(None), SortField::CreatedAt);
    }

    #[test]
    fn sort_order_is_ascending_unless_desc() {
        assert_eq!(SortOrder::parse(Some("desc")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(Some("DESC")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(None), SortOrder::Asc);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(100, 10), 10);
        assert_eq!(total_pages(7, 1), 7);
    }
}
