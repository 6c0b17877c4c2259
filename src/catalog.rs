//! Catálogo de productos sobre SQLite: esquema, semilla y consultas.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, types::Value, Connection};
use tracing::info;

use crate::error::{AssistantError, Result};
use crate::models::{NewProduct, Product, ProductFilter};

/// Handle del catálogo. Se abre una vez al arrancar y se comparte vía `Arc`.
pub struct CatalogStore {
    conn: Mutex<Connection>,
}

impl CatalogStore {
    /// Abre (o crea) la base de datos en `path` y asegura el esquema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        info!("Catálogo abierto en {}", path.display());

        let store = Self { conn: Mutex::new(conn) };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Base de datos en memoria (tests).
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| AssistantError::StoreUnavailable(format!("Lock envenenado: {e}")))?;
        f(&mut conn)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS products (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    brand TEXT,
                    name TEXT,
                    price REAL,
                    rating REAL,
                    url TEXT
                );",
            )?;
            Ok(())
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
            Ok(n as usize)
        })
    }

    /// Inserta los productos de ejemplo sólo si la tabla está vacía.
    /// Devuelve cuántos se insertaron.
    pub fn seed_if_empty(&self) -> Result<usize> {
        if self.count()? > 0 {
            return Ok(0);
        }
        let inserted = self.insert_products(&seed_products())?;
        info!("Catálogo vacío: insertados {inserted} productos de ejemplo.");
        Ok(inserted)
    }

    /// Valida e inserta todos los productos en una única transacción.
    /// Si alguno es inválido no se inserta ninguno.
    pub fn insert_products(&self, products: &[NewProduct]) -> Result<usize> {
        for p in products {
            p.validate()?;
        }
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO products (brand, name, price, rating, url) VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for p in products {
                    stmt.execute(params![p.brand.trim(), p.name.trim(), p.price, p.rating, p.url.trim()])?;
                }
            }
            tx.commit()?;
            Ok(products.len())
        })
    }

    /// Consulta de sólo lectura. Orden: rating desc, precio asc, orden de
    /// inserción.
    pub fn query(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut sql =
            String::from("SELECT id, brand, name, price, rating, url FROM products WHERE 1=1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(brand) = filter.brand {
            sql.push_str(" AND UPPER(brand) = UPPER(?)");
            args.push(Value::Text(brand.as_str().to_string()));
        }
        if let Some(min_rating) = filter.min_rating {
            sql.push_str(" AND rating >= ?");
            args.push(Value::Real(min_rating));
        }
        if let Some(min_price) = filter.min_price {
            sql.push_str(" AND price >= ?");
            args.push(Value::Real(min_price));
        }
        if let Some(max_price) = filter.max_price {
            sql.push_str(" AND price <= ?");
            args.push(Value::Real(max_price));
        }
        sql.push_str(" ORDER BY rating DESC, price ASC, id ASC LIMIT ?");
        args.push(Value::Integer(filter.limit() as i64));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok(Product {
                    id: row.get(0)?,
                    brand: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    price: row.get(3)?,
                    rating: row.get(4)?,
                    url: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?;
            let products = rows.collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(products)
        })
    }
}

/// Productos de ejemplo (enlaces de búsqueda de Amazon, precios en USD).
pub fn seed_products() -> Vec<NewProduct> {
    vec![
        NewProduct::new("NIKE", "Pegasus 40 Running Shoes (Women)", 129.99, 5.0, "https://www.amazon.com/s?k=nike+pegasus+40"),
        NewProduct::new("NIKE", "Winflo 9 Premium Running Shoes (Women)", 109.99, 5.0, "https://www.amazon.com/s?k=nike+winflo+9"),
        NewProduct::new("ADIDAS", "Ultraboost Light", 189.99, 4.7, "https://www.amazon.com/s?k=adidas+ultraboost+light"),
        NewProduct::new("PUMA", "Deviate Nitro 2", 159.99, 4.6, "https://www.amazon.com/s?k=puma+deviate+nitro+2"),
        NewProduct::new("NIKE", "Vomero 17", 149.99, 4.6, "https://www.amazon.com/s?k=nike+vomero+17"),
        NewProduct::new("NIKE", "Revolution 7", 69.99, 4.3, "https://www.amazon.com/s?k=nike+revolution+7"),
        NewProduct::new("ADIDAS", "Adizero Boston 12", 159.99, 4.5, "https://www.amazon.com/s?k=adidas+adizero+boston+12"),
        NewProduct::new("ADIDAS", "Samba OG", 100.00, 4.8, "https://www.amazon.com/s?k=adidas+samba+og"),
        NewProduct::new("ADIDAS", "Terrex Free Hiker 2", 229.99, 4.6, "https://www.amazon.com/s?k=adidas+terrex+free+hiker+2"),
        NewProduct::new("ADIDAS", "Duramo SL", 65.00, 4.2, "https://www.amazon.com/s?k=adidas+duramo+sl"),
        NewProduct::new("PUMA", "Velocity Nitro 3", 139.99, 4.5, "https://www.amazon.com/s?k=puma+velocity+nitro+3"),
        NewProduct::new("PUMA", "Suede Classic XXI", 75.00, 4.4, "https://www.amazon.com/s?k=puma+suede+classic"),
    ]
}
