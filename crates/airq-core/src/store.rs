use crate::entity::{alerts, measurements};
use crate::error::Result;
use crate::geo::BoundingBox;
use crate::record::RecordStore;
use airq_types::{AlertRecord, Measurement, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    FromQueryResult, QueryFilter, QueryOrder, QuerySelect, Schema, Set,
};
use tracing::{debug, info};

#[derive(Debug, FromQueryResult)]
struct SumCount {
    sum: Option<f64>,
    count: i64,
}

/// sea-orm 实现的持久化存储（PostgreSQL / SQLite）
#[derive(Clone)]
pub struct SeaOrmRecordStore {
    db: DatabaseConnection,
}

impl SeaOrmRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// 连接数据库
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = Database::connect(database_url).await?;
        info!(backend = ?db.get_database_backend(), "Connected to record store");
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// 按实体定义建表（已存在则跳过）
    pub async fn ensure_schema(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut measurements_table = schema.create_table_from_entity(measurements::Entity);
        measurements_table.if_not_exists();
        self.db.execute(backend.build(&measurements_table)).await?;

        let mut alerts_table = schema.create_table_from_entity(alerts::Entity);
        alerts_table.if_not_exists();
        self.db.execute(backend.build(&alerts_table)).await?;

        debug!("Record store schema ensured");
        Ok(())
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl From<alerts::Model> for AlertRecord {
    fn from(model: alerts::Model) -> Self {
        AlertRecord {
            parameter: model.parameter,
            value: model.value,
            latitude: model.latitude,
            longitude: model.longitude,
            timestamp: from_millis(model.timestamp),
            description: model.description,
        }
    }
}

#[async_trait]
impl RecordStore for SeaOrmRecordStore {
    async fn save_measurement(&self, measurement: &Measurement) -> Result<()> {
        let row = measurements::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            parameter: Set(measurement.parameter.clone()),
            value: Set(measurement.value),
            latitude: Set(measurement.latitude),
            longitude: Set(measurement.longitude),
            timestamp: Set(to_millis(measurement.timestamp)),
        };
        row.insert(&self.db).await?;

        debug!(parameter = %measurement.parameter, "Measurement saved");
        Ok(())
    }

    async fn save_alert(&self, alert: &AlertRecord) -> Result<()> {
        let row = alerts::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            parameter: Set(alert.parameter.clone()),
            value: Set(alert.value),
            latitude: Set(alert.latitude),
            longitude: Set(alert.longitude),
            timestamp: Set(to_millis(alert.timestamp)),
            description: Set(alert.description.clone()),
        };
        row.insert(&self.db).await?;

        debug!(parameter = %alert.parameter, description = %alert.description, "Alert saved");
        Ok(())
    }

    async fn recent_alerts(&self, window: Duration) -> Result<Vec<AlertRecord>> {
        let since = to_millis(Utc::now() - window);
        let rows = alerts::Entity::find()
            .filter(alerts::Column::Timestamp.gte(since))
            .order_by_asc(alerts::Column::Timestamp)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(AlertRecord::from).collect())
    }

    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>> {
        let rows = alerts::Entity::find()
            .filter(alerts::Column::Timestamp.gte(to_millis(start)))
            .filter(alerts::Column::Timestamp.lte(to_millis(end)))
            .order_by_desc(alerts::Column::Timestamp)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(AlertRecord::from).collect())
    }

    async fn alerts_in_box(&self, bbox: &BoundingBox) -> Result<Vec<AlertRecord>> {
        let rows = alerts::Entity::find()
            .filter(alerts::Column::Latitude.gte(bbox.min_lat))
            .filter(alerts::Column::Latitude.lte(bbox.max_lat))
            .filter(alerts::Column::Longitude.gte(bbox.min_lon))
            .filter(alerts::Column::Longitude.lte(bbox.max_lon))
            .order_by_desc(alerts::Column::Timestamp)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(AlertRecord::from).collect())
    }

    async fn sum_and_count(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<(f64, i64)> {
        let row = measurements::Entity::find()
            .select_only()
            .column_as(Expr::col(measurements::Column::Value).sum(), "sum")
            .column_as(Expr::col(measurements::Column::Id).count(), "count")
            .filter(measurements::Column::Parameter.eq(parameter))
            .filter(measurements::Column::Timestamp.gte(to_millis(cutoff)))
            .into_model::<SumCount>()
            .one(&self.db)
            .await?;

        Ok(match row {
            Some(SumCount { sum, count }) => (sum.unwrap_or(0.0), count),
            None => (0.0, 0),
        })
    }

    async fn samples_since(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<Vec<Sample>> {
        let rows = measurements::Entity::find()
            .filter(measurements::Column::Parameter.eq(parameter))
            .filter(measurements::Column::Timestamp.gte(to_millis(cutoff)))
            .order_by_asc(measurements::Column::Timestamp)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Sample::new(from_millis(row.timestamp), row.value))
            .collect())
    }
}
