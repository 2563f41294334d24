// src/services/fabric.rs
use crate::errors::AnalysisError;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fabric {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Fabrics the workshop embroiders on. The built-in six can be extended
/// from configuration; extra entries use their id as display name.
#[derive(Debug, Clone)]
pub struct FabricCatalog {
    fabrics: Vec<Fabric>,
}

const BUILT_IN: [(&str, &str, &str); 6] = [
    ("Linen", "Vải Linen (Lanh)", "Thấm hút tốt, mộc mạc"),
    ("Silk", "Lụa Tơ Tằm", "Mềm mại, óng ả, cao cấp"),
    ("Velvet", "Vải Nhung", "Dày, sang trọng, thêu nổi"),
    ("Organza", "Vải Organza (Tơ)", "Trong suốt, bay bổng"),
    ("Cotton", "Vải Cotton", "Bền màu, dễ thêu"),
    ("Canvas", "Vải Bố (Canvas)", "Dày dặn, thêu túi/decor"),
];

impl Default for FabricCatalog {
    fn default() -> Self {
        Self {
            fabrics: BUILT_IN
                .iter()
                .map(|(id, name, description)| Fabric {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect(),
        }
    }
}

impl FabricCatalog {
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::default();
        for id in extra {
            let id = id.as_ref().trim();
            if id.is_empty() || catalog.find(id).is_some() {
                continue;
            }
            catalog.fabrics.push(Fabric {
                id: id.to_string(),
                name: id.to_string(),
                description: String::new(),
            });
        }
        catalog
    }

    /// Case-insensitive lookup by id or display name.
    pub fn find(&self, key: &str) -> Option<&Fabric> {
        let key = key.trim();
        self.fabrics
            .iter()
            .find(|f| f.id.eq_ignore_ascii_case(key) || f.name.to_lowercase() == key.to_lowercase())
    }

    pub fn resolve(&self, key: &str) -> Result<&Fabric, AnalysisError> {
        self.find(key).ok_or_else(|| {
            AnalysisError::InvalidInput(format!(
                "unsupported fabric type `{}` (expected one of: {})",
                key.trim(),
                self.ids().join(", ")
            ))
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.fabrics.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn all(&self) -> &[Fabric] {
        &self.fabrics
    }
}
