use super::QrelSource;
use crate::model::QrelRow;

#[derive(Debug, Clone, Default)]
pub struct MemoryQrels {
    rows: Vec<QrelRow>,
}

impl MemoryQrels {
    pub fn new(mut rows: Vec<QrelRow>) -> Self {
        rows.sort_by(|a, b| {
            a.query_id
                .cmp(&b.query_id)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        Self { rows }
    }
}

impl QrelSource for MemoryQrels {
    fn count(&self) -> anyhow::Result<u64> {
        Ok(self.rows.len() as u64)
    }

    fn fetch(&self, offset: u64, limit: u64) -> anyhow::Result<Vec<QrelRow>> {
        Ok(self
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.rows.len())
    }
}
