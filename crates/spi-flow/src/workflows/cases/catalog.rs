use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceCode {
    Rm,
    Rmbusq,
    Busq,
    Conta,
    Prec,
    Rtao,
    Renm,
    Oporm,
    Afec,
    RegSan,
}

impl ServiceCode {
    pub const fn ordered() -> [Self; 10] {
        [
            Self::Rm,
            Self::Rmbusq,
            Self::Busq,
            Self::Conta,
            Self::Prec,
            Self::Rtao,
            Self::Renm,
            Self::Oporm,
            Self::Afec,
            Self::RegSan,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Rm => "Registro de Marca",
            Self::Rmbusq => "Registro de Marca + Búsqueda",
            Self::Busq => "Búsqueda de Antecedentes",
            Self::Conta => "Contestación",
            Self::Prec => "Oposición / Precautoria",
            Self::Rtao => "Recurso ante TAO",
            Self::Renm => "Renovación de Marca",
            Self::Oporm => "Oposición Registro de Marca",
            Self::Afec => "Afectaciones",
            Self::RegSan => "Registro Sanitario",
        }
    }

    pub const fn area(self) -> ServiceArea {
        match self {
            Self::Rm | Self::Rmbusq | Self::Busq | Self::Renm | Self::Oporm => {
                ServiceArea::IntellectualProperty
            }
            Self::Conta | Self::Prec | Self::Rtao | Self::Afec | Self::RegSan => {
                ServiceArea::AdministrativeRegulatory
            }
        }
    }
}

/// Practice area derived from the service code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceArea {
    #[serde(rename = "PI")]
    IntellectualProperty,
    #[serde(rename = "AR")]
    AdministrativeRegulatory,
}

impl ServiceArea {
    pub const fn label(self) -> &'static str {
        match self {
            Self::IntellectualProperty => "Propiedad Intelectual",
            Self::AdministrativeRegulatory => "Asuntos Regulatorios",
        }
    }
}

/// How the client satisfies a required document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Sign,
    Upload,
    Text,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sign => "signature-required",
            Self::Upload => "plain-upload",
            Self::Text => "free-text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentTemplate {
    pub document_type: &'static str,
    pub name: &'static str,
    pub kind: DocumentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
}

const fn template(
    document_type: &'static str,
    name: &'static str,
    kind: DocumentKind,
) -> DocumentTemplate {
    DocumentTemplate {
        document_type,
        name,
        kind,
        description: None,
    }
}

const fn described(
    document_type: &'static str,
    name: &'static str,
    kind: DocumentKind,
    description: &'static str,
) -> DocumentTemplate {
    DocumentTemplate {
        document_type,
        name,
        kind,
        description: Some(description),
    }
}

/// Required-document templates and vault retention rules per service.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    templates: BTreeMap<ServiceCode, Vec<DocumentTemplate>>,
    vault_retention_days: BTreeMap<String, i64>,
}

impl ServiceCatalog {
    pub fn standard() -> Self {
        let templates = ServiceCode::ordered()
            .into_iter()
            .map(|code| (code, standard_templates(code)))
            .collect();

        let vault_retention_days = [
            ("cedula_identidad", 365),
            ("poder_legal", 365),
            ("certificado_vigente", 180),
            ("certificado_marca", 180),
            ("clv", 180),
            ("gmp", 180),
        ]
        .into_iter()
        .map(|(document_type, days)| (document_type.to_string(), days))
        .collect();

        Self {
            templates,
            vault_retention_days,
        }
    }

    /// Overrides (or adds) the retention window for a document type.
    pub fn with_vault_retention(mut self, document_type: &str, days: i64) -> Self {
        self.vault_retention_days
            .insert(document_type.to_string(), days);
        self
    }

    pub fn templates_for(&self, code: ServiceCode) -> &[DocumentTemplate] {
        self.templates
            .get(&code)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `None` means documents of this type never enter the vault.
    pub fn vault_retention(&self, document_type: &str) -> Option<Duration> {
        self.vault_retention_days
            .get(document_type)
            .map(|days| Duration::days(*days))
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn standard_templates(code: ServiceCode) -> Vec<DocumentTemplate> {
    use DocumentKind::{Sign, Text, Upload};

    match code {
        ServiceCode::Rm => vec![
            template("poder_legal", "Poder Simple", Sign),
            described(
                "logo_marca",
                "Logo de la Marca",
                Upload,
                "Formato JPG/PNG, 300 DPI mínimo, con referencia Pantone y RGB.",
            ),
            template(
                "descripcion_actividad",
                "Descripción de Actividad Económica",
                Text,
            ),
            template(
                "cedula_identidad",
                "Cédula de Identidad del Solicitante",
                Upload,
            ),
        ],
        ServiceCode::Rmbusq => vec![
            template("poder_legal", "Poder Simple", Sign),
            template("logo_marca", "Logo de la Marca", Upload),
            template("informe_busqueda", "Informe de Búsqueda Fonética", Upload),
            template("cedula_identidad", "Cédula de Identidad", Upload),
            template("descripcion_actividad", "Descripción de Actividad", Text),
        ],
        ServiceCode::Busq => vec![
            template("solicitud_busqueda", "Solicitud de Búsqueda", Text),
            template("denominacion", "Denominación a buscar", Text),
        ],
        ServiceCode::Conta => vec![
            template("poder_legal", "Poder Legal", Sign),
            template("copia_acto", "Copia Acto Administrativo", Upload),
            described(
                "plantilla_firma",
                "Plantilla Firma Digital",
                Sign,
                "Requiere firma electrónica avanzada.",
            ),
            template("respuesta_fundada", "Respuesta Fundada", Text),
        ],
        ServiceCode::Prec => vec![
            template("poder_legal", "Poder Legal", Sign),
            template("copia_acto", "Copia Acto Administrativo", Upload),
            template(
                "antecedentes_oposicion",
                "Antecedentes de Oposición",
                Upload,
            ),
        ],
        ServiceCode::Rtao => vec![
            template("poder_legal", "Poder Legal Especial", Sign),
            template("resolucion_impugnada", "Resolución Impugnada", Upload),
            template("fundamentos_recurso", "Fundamentos del Recurso", Text),
            template("prueba_documental", "Prueba Documental", Upload),
        ],
        ServiceCode::Renm => vec![
            template("poder_legal", "Poder Simple", Sign),
            template(
                "certificado_vigente",
                "Certificado de Marca Vigente",
                Upload,
            ),
            template(
                "comprobante_pago",
                "Comprobante de Pago Renovación",
                Upload,
            ),
        ],
        ServiceCode::Oporm => vec![
            template("poder_legal", "Poder Legal", Sign),
            template(
                "publicacion_diario",
                "Publicación en Diario Oficial",
                Upload,
            ),
            template(
                "fundamentos_oposicion",
                "Fundamentos de la Oposición",
                Text,
            ),
            template("prueba_uso", "Prueba de Uso de Marca", Upload),
        ],
        ServiceCode::Afec => vec![
            described(
                "documento_cesion",
                "Documento de Cesión",
                Upload,
                "Acta notarial de cesión de derechos de propiedad industrial.",
            ),
            described(
                "descripcion_afectacion",
                "Descripción de la Afectación",
                Text,
                "Cesión total, parcial, licencia u otra afectación.",
            ),
            template("poder_legal", "Poder Legal", Sign),
            template(
                "certificado_marca",
                "Certificado de Marca Afectada",
                Upload,
            ),
        ],
        ServiceCode::RegSan => vec![
            template("poder_legal", "Poder Legal Especial", Sign),
            template("form_minsal", "Formulario MINSAL Oficial", Upload),
            template(
                "clv",
                "Certificado de Libre Venta (Apostillado)",
                Upload,
            ),
            template("formula", "Fórmula Cualicuantitativa", Upload),
            template(
                "specs",
                "Especificaciones Técnicas Físico-Químicas",
                Text,
            ),
            template("rotulo", "Bocetos de Rótulos y Empaques", Upload),
            template(
                "estabilidad",
                "Ensayo de Estabilidad Acelerada",
                Upload,
            ),
            described(
                "gmp",
                "Certificado de Buenas Prácticas (GMP)",
                Upload,
                "Emitido por autoridad sanitaria de origen.",
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_service_has_required_documents() {
        let catalog = ServiceCatalog::standard();
        for code in ServiceCode::ordered() {
            assert!(
                !catalog.templates_for(code).is_empty(),
                "{} has no templates",
                code.label()
            );
        }
    }

    #[test]
    fn areas_follow_catalog_categories() {
        assert_eq!(ServiceCode::Rm.area(), ServiceArea::IntellectualProperty);
        assert_eq!(ServiceCode::Conta.area(), ServiceArea::AdministrativeRegulatory);
        assert_eq!(ServiceCode::RegSan.area(), ServiceArea::AdministrativeRegulatory);
    }

    #[test]
    fn service_codes_serialize_as_catalog_keys() {
        let encoded = serde_json::to_value(ServiceCode::RegSan).expect("serializes");
        assert_eq!(encoded, serde_json::json!("REG_SAN"));
        let decoded: ServiceCode =
            serde_json::from_value(serde_json::json!("RMBUSQ")).expect("deserializes");
        assert_eq!(decoded, ServiceCode::Rmbusq);
    }

    #[test]
    fn identity_documents_outlive_certificates_in_vault() {
        let catalog = ServiceCatalog::standard();
        let identity = catalog
            .vault_retention("cedula_identidad")
            .expect("identity documents are vaulted");
        let certificate = catalog
            .vault_retention("certificado_vigente")
            .expect("certificates are vaulted");
        assert_eq!(identity, Duration::days(365));
        assert!(certificate < identity);
        assert!(catalog.vault_retention("logo_marca").is_none());
    }

    #[test]
    fn retention_can_be_overridden() {
        let catalog = ServiceCatalog::standard().with_vault_retention("logo_marca", 30);
        assert_eq!(catalog.vault_retention("logo_marca"), Some(Duration::days(30)));
    }
}
