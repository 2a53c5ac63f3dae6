//! DIA web service operations

use std::fmt;
use std::str::FromStr;

use erpgate_core::{ErpError, Result};

const SIS_ENDPOINT: &str = "/SIS/json";
const SCF_ENDPOINT: &str = "/SCF/json";

/// SCF (stok-cari-fatura) record types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScfEntity {
    CariKart,
    StokKart,
    FaturaFisi,
}

impl ScfEntity {
    pub const ALL: [ScfEntity; 3] = [ScfEntity::CariKart, ScfEntity::StokKart, ScfEntity::FaturaFisi];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScfEntity::CariKart => "carikart",
            ScfEntity::StokKart => "stokkart",
            ScfEntity::FaturaFisi => "faturafisi",
        }
    }
}

/// List, get, create, update, delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScfAction {
    Listele,
    Getir,
    Ekle,
    Guncelle,
    Sil,
}

impl ScfAction {
    pub const ALL: [ScfAction; 5] = [
        ScfAction::Listele,
        ScfAction::Getir,
        ScfAction::Ekle,
        ScfAction::Guncelle,
        ScfAction::Sil,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScfAction::Listele => "listele",
            ScfAction::Getir => "getir",
            ScfAction::Ekle => "ekle",
            ScfAction::Guncelle => "guncelle",
            ScfAction::Sil => "sil",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, ScfAction::Ekle | ScfAction::Guncelle | ScfAction::Sil)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiaOperation {
    /// Remaining credit (kontör) of the account
    KontorSorgula,
    /// Companies, periods, branches and depots the user may access
    YetkiliFirmaDonem,
    Scf(ScfEntity, ScfAction),
}

impl DiaOperation {
    pub fn all() -> impl Iterator<Item = DiaOperation> {
        [DiaOperation::KontorSorgula, DiaOperation::YetkiliFirmaDonem]
            .into_iter()
            .chain(ScfEntity::ALL.into_iter().flat_map(|entity| {
                ScfAction::ALL
                    .into_iter()
                    .map(move |action| DiaOperation::Scf(entity, action))
            }))
    }

    /// Operation identifier accepted by `execute`
    pub fn name(&self) -> String {
        match self {
            DiaOperation::KontorSorgula => "kontor_sorgula".to_string(),
            DiaOperation::YetkiliFirmaDonem => "yetkili_firma_donem".to_string(),
            DiaOperation::Scf(..) => self.service_name(),
        }
    }

    /// Key of the request body, as the web service names it
    pub fn service_name(&self) -> String {
        match self {
            DiaOperation::KontorSorgula => "sis_kontor_sorgula".to_string(),
            DiaOperation::YetkiliFirmaDonem => "sis_yetkili_firma_donem_sube_depo".to_string(),
            DiaOperation::Scf(entity, action) => {
                format!("scf_{}_{}", entity.as_str(), action.as_str())
            }
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            DiaOperation::KontorSorgula | DiaOperation::YetkiliFirmaDonem => SIS_ENDPOINT,
            DiaOperation::Scf(..) => SCF_ENDPOINT,
        }
    }

    pub fn is_scf(&self) -> bool {
        matches!(self, DiaOperation::Scf(..))
    }

    pub(crate) fn sis_endpoint() -> &'static str {
        SIS_ENDPOINT
    }
}

impl fmt::Display for DiaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for DiaOperation {
    type Err = ErpError;

    /// Accepts both the operation identifier and the service name
    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .find(|op| op.name() == s || op.service_name() == s)
            .ok_or_else(|| ErpError::UnknownOperation(format!("DIA operation '{}'", s)))
    }
}
