//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx2dF};

pub use crate::data::{
    BinaryMask, CalibratedImage, CorrectionMask, CtSeries, CtWindow, PatientInfo, Phantom,
    RawSlice, SliceMeta, SliceSource, TissueBand,
};
pub use crate::error::{DoseError, DoseResult, DoseWarning, Outcome};

pub use crate::segment::{remove_table, segment, SegmentationConfig};

pub use crate::diameter::manual::{manual_diameter, ManualInput};
pub use crate::diameter::{
    diameter_from_image, water_equivalent_diameter, DiameterConfig, DiameterMethod,
    DiameterResult, TissueCorrection, WaterConfig, WaterRoi,
};

pub use crate::volume::{
    aggregate, DiameterMode, ProgressReporter, SamplingPlan, SamplingPolicy, Silent,
    VolumeDiameter,
};

#[cfg(feature = "rayon")]
pub use crate::volume::par_aggregate;

pub use crate::dose::{
    central_peripheral, contour_stats, ctdi_from_dicom, ctdi_from_technique, dose_map,
    resolve_coefficients, CentralPeripheral, CoefficientSource, CoefficientTable,
    ConversionFactor, CtdiEstimate, DistanceMode, EffectiveDoseModel, SsdeResult, Technique,
};

pub use crate::session::{DiameterKind, DoseSession, PatientRecord};
