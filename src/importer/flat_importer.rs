// ==========================================
// 表格导入框架 - 分段导入流水线
// ==========================================
// 职责: 解析 → 检查 → 导入 → 收尾 → 落库正确性校验
// 流程:
// 1. Parse: 预处理矩阵，识别段类型，物化记录（结构错误立即失败）
// 2. Check: 格式校验 + 段检查器，收集全部失败行后统一报错
// 3. Import: 串行（首错即停）或有界并发（首错停止准入）
// 4. PostHandle: 中间件收尾 → 收尾处理器 → 失败明细落盘
// 5. CheckCorrect: 依次执行已启用的正确性校验器
// ==========================================

use crate::checker::CorrectnessChecker;
use crate::config::ImportControl;
use crate::domain::mapping::{ColumnMappingResolver, DeclaredColumnResolver};
use crate::domain::record::Record;
use crate::domain::row::{CellMatrix, RowContext, WholeImportContext};
use crate::domain::types::{PipelineStage, SectionType};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::format_checker;
use crate::importer::import_traits::{
    FlatMiddleware, PostHandler, Recognizer, SectionChecker, SectionImporter, TabularSource,
};
use crate::importer::materializer::Materializer;
use crate::importer::progress::{ImportReport, ProgressReporter, ProgressStatus};
use crate::importer::recorder::UnexpectedRecorder;
use crate::importer::worker_pool::WorkerPool;
use crate::middleware::BatchWriter;
use crate::perf::PerfGuard;
use crate::repository::ImportStore;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

type SharedFlatMiddlewares<R> = Arc<Mutex<Vec<Box<dyn FlatMiddleware<R>>>>>;

// ==========================================
// FlatRuntime - 导入阶段共享给各 worker 的组件
// ==========================================
struct FlatRuntime<R: Record> {
    store: Arc<dyn ImportStore>,
    importers: HashMap<SectionType, Arc<dyn SectionImporter<R>>>,
    middlewares: SharedFlatMiddlewares<R>,
    progress: Arc<ProgressReporter>,
    recorder: Arc<UnexpectedRecorder>,
}

impl<R: Record> FlatRuntime<R> {
    /// 导入一行并提交进度；未注册导入器的行跳过
    async fn import_row(&self, row: &mut RowContext<R>) -> ImportResult<()> {
        let Some(importer) = self.importers.get(row.section()).cloned() else {
            warn!(line = row.line(), section = %row.section(), "未注册导入器，跳过该行");
            self.progress.commit(ProgressStatus::Skipped);
            return Ok(());
        };

        match self.import_unit(importer.as_ref(), row).await {
            Ok(()) => {
                self.progress.commit(ProgressStatus::Success);
                Ok(())
            }
            Err(e) => {
                error!(line = row.line(), error = %e, "行导入失败");
                self.recorder
                    .record_import_failure(vec![row.line()], e.to_string());
                self.progress.commit(ProgressStatus::Failed);
                Err(ImportError::unit(vec![row.line()], e))
            }
        }
    }

    async fn import_unit(
        &self,
        importer: &dyn SectionImporter<R>,
        row: &mut RowContext<R>,
    ) -> ImportResult<()> {
        importer.import(self.store.as_ref(), row).await?;

        let mut middlewares = self.middlewares.lock().await;
        for m in middlewares.iter_mut() {
            m.post_row_import(self.store.as_ref(), row).await?;
        }
        Ok(())
    }
}

// ==========================================
// FlatImporter - 分段导入流水线
// ==========================================
pub struct FlatImporter<R: Record> {
    store: Arc<dyn ImportStore>,
    control: ImportControl,
    resolver: Arc<dyn ColumnMappingResolver>,
    recognizer: Recognizer,
    checkers: HashMap<SectionType, Arc<dyn SectionChecker<R>>>,
    importers: HashMap<SectionType, Arc<dyn SectionImporter<R>>>,
    post_handlers: Vec<Arc<dyn PostHandler>>,
    middlewares: SharedFlatMiddlewares<R>,
    correctness: Vec<Box<dyn CorrectnessChecker>>,
    progress: Arc<ProgressReporter>,
    recorder: Arc<UnexpectedRecorder>,
    stage: PipelineStage,
    run_id: String,
}

impl<R: Record> FlatImporter<R> {
    /// 创建流水线
    ///
    /// # 参数
    /// - store: 存储句柄（事务由调用方控制）
    /// - control: 导入控制参数
    /// - recognizer: 段识别器
    ///
    /// # 说明
    /// - 启用批量写入时，导入开始前在用户中间件之后追加 BatchWriter
    pub fn new(
        store: Arc<dyn ImportStore>,
        control: ImportControl,
        recognizer: Recognizer,
    ) -> ImportResult<Self> {
        control.settings.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let recorder = Arc::new(UnexpectedRecorder::new(
            run_id.clone(),
            control.settings.failure_dir.clone(),
        ));

        Ok(Self {
            store,
            control,
            resolver: Arc::new(DeclaredColumnResolver),
            recognizer,
            checkers: HashMap::new(),
            importers: HashMap::new(),
            post_handlers: Vec::new(),
            middlewares: Arc::new(Mutex::new(Vec::new())),
            correctness: Vec::new(),
            progress: Arc::new(ProgressReporter::new("flat_import")),
            recorder,
            stage: PipelineStage::Idle,
            run_id,
        })
    }

    /// 单段流水线: 所有行属于同一段，由同一个导入器处理
    pub fn one_section(
        store: Arc<dyn ImportStore>,
        control: ImportControl,
        importer: impl SectionImporter<R> + 'static,
    ) -> ImportResult<Self> {
        let recognizer: Recognizer = Arc::new(|_: &[String]| SectionType::one_section());
        Ok(Self::new(store, control, recognizer)?
            .with_importer(SectionType::one_section(), importer))
    }

    pub fn with_resolver(mut self, resolver: impl ColumnMappingResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_checker(
        mut self,
        section: impl Into<SectionType>,
        checker: impl SectionChecker<R> + 'static,
    ) -> Self {
        self.checkers.insert(section.into(), Arc::new(checker));
        self
    }

    pub fn with_importer(
        mut self,
        section: impl Into<SectionType>,
        importer: impl SectionImporter<R> + 'static,
    ) -> Self {
        self.importers.insert(section.into(), Arc::new(importer));
        self
    }

    /// 收尾处理器按注册顺序执行
    pub fn with_post_handler(mut self, handler: impl PostHandler + 'static) -> Self {
        self.post_handlers.push(Arc::new(handler));
        self
    }

    /// 中间件按注册顺序执行
    pub fn with_middleware(mut self, middleware: impl FlatMiddleware<R> + 'static) -> Self {
        // 构建期中间件列表尚未共享
        if let Some(list) = Arc::get_mut(&mut self.middlewares) {
            list.get_mut().push(Box::new(middleware));
        }
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn recorder(&self) -> &UnexpectedRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<dyn ImportStore> {
        &self.store
    }

    fn expect_stage(&self, expected: PipelineStage) -> ImportResult<()> {
        if self.stage != expected {
            return Err(ImportError::InvalidStage {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    // ==========================================
    // 阶段 1: Parse
    // ==========================================

    /// 解析单元格矩阵
    ///
    /// # 返回
    /// - Ok(WholeImportContext): 全部行（含段类型与物化记录）
    /// - Err: 结构错误（映射不匹配、列越界、严格类型失败）
    pub fn parse(&mut self, matrix: CellMatrix) -> ImportResult<WholeImportContext<R>> {
        self.expect_stage(PipelineStage::Idle)?;

        let mapping = Arc::new(self.resolver.resolve(&R::shape()));
        let materializer = Materializer::<R>::new(Arc::clone(&mapping), self.control.settings.strict_types)?;
        let rows = self
            .control
            .preprocessor(mapping.min_column_count())
            .run(matrix);
        debug!(rows = rows.len(), columns = mapping.min_column_count(), "预处理完成");

        let mut contexts = Vec::with_capacity(rows.len());
        for row in rows {
            let section = (self.recognizer)(&row.cells);
            let record = materializer.materialize(&row.cells, row.line())?;
            contexts.push(RowContext::new(section, row, record));
        }

        info!(run_id = %self.run_id, rows = contexts.len(), "解析完成");
        self.stage = PipelineStage::Parsed;
        Ok(WholeImportContext::new(contexts, mapping))
    }

    // ==========================================
    // 阶段 2: Check
    // ==========================================

    /// 内容检查: 每个不合格行在错误汇中登记一条，全部检查完后统一报错
    pub fn check(&mut self, whole: &WholeImportContext<R>) -> ImportResult<()> {
        self.expect_stage(PipelineStage::Parsed)?;

        let format_check = self.control.settings.enable_format_check && !whole.mapping().is_empty();
        let mut failed_rows = 0usize;

        for row in whole.rows() {
            let mut messages = Vec::new();

            if format_check {
                let violations = format_checker::check_row(whole.mapping(), row.cells());
                if !violations.is_empty() {
                    messages.push(format_checker::describe(&violations));
                }
            }
            if let Some(checker) = self.checkers.get(row.section()) {
                if let Err(e) = checker.check_valid(row) {
                    messages.push(e.to_string());
                }
            }

            if !messages.is_empty() {
                failed_rows += 1;
                self.recorder
                    .record_check_failure(row.line(), messages.join("; "));
            }
        }

        if failed_rows > 0 {
            warn!(run_id = %self.run_id, failed_rows, "内容检查未通过");
            return Err(ImportError::ContentCheckFailed { failed_rows });
        }

        debug!(run_id = %self.run_id, rows = whole.len(), "内容检查通过");
        self.stage = PipelineStage::Checked;
        Ok(())
    }

    // ==========================================
    // 阶段 3: Import
    // ==========================================

    fn runtime(&self) -> FlatRuntime<R> {
        FlatRuntime {
            store: Arc::clone(&self.store),
            importers: self.importers.clone(),
            middlewares: Arc::clone(&self.middlewares),
            progress: Arc::clone(&self.progress),
            recorder: Arc::clone(&self.recorder),
        }
    }

    /// 导入全部行
    pub async fn import(&mut self, whole: &mut WholeImportContext<R>) -> ImportResult<()> {
        self.expect_stage(PipelineStage::Checked)?;

        {
            let mut middlewares = self.middlewares.lock().await;
            if self.control.settings.enable_batch {
                middlewares.push(Box::new(BatchWriter::new(self.control.settings.batch_size)));
            }
            for m in middlewares.iter_mut() {
                m.pre_import(self.store.as_ref(), whole).await?;
            }
        }

        let parallelism = self.control.settings.effective_parallelism();
        self.progress.start(whole.len());
        let mut perf = PerfGuard::new("flat_import");
        perf.set_units(whole.len());

        let runtime = Arc::new(self.runtime());
        let mut rows = whole.take_rows();

        let result = if parallelism > 1 {
            debug!(parallelism, "并发导入");
            let pool = WorkerPool::new(parallelism);
            let outcome = pool
                .run(rows, |mut row| {
                    let rt = Arc::clone(&runtime);
                    async move {
                        let result = rt.import_row(&mut row).await;
                        (row, result)
                    }
                })
                .await;
            let (units, first_error) = outcome.into_units();
            rows = units;
            first_error.map_or(Ok(()), Err)
        } else {
            let mut result = Ok(());
            for row in rows.iter_mut() {
                if let Err(e) = runtime.import_row(row).await {
                    result = Err(e);
                    break;
                }
            }
            result
        };

        whole.restore_rows(rows);
        let state = self.progress.finish();
        result?;

        info!(
            run_id = %self.run_id,
            succeeded = state.succeeded,
            skipped = state.skipped,
            "导入完成"
        );
        self.stage = PipelineStage::Imported;
        Ok(())
    }

    // ==========================================
    // 阶段 4: PostHandle
    // ==========================================

    /// 收尾: 中间件（含批量写入刷盘）→ 收尾处理器 → 失败明细落盘
    pub async fn post_handle(&mut self) -> ImportResult<()> {
        self.expect_stage(PipelineStage::Imported)?;

        {
            let mut middlewares = self.middlewares.lock().await;
            for m in middlewares.iter_mut() {
                m.post_handle(self.store.as_ref()).await?;
            }
        }
        for handler in &self.post_handlers {
            handler.post_handle(self.store.as_ref()).await?;
        }
        self.recorder.flush()?;

        debug!(run_id = %self.run_id, "收尾完成");
        self.stage = PipelineStage::Finalized;
        Ok(())
    }

    // ==========================================
    // 阶段 5: 落库正确性校验
    // ==========================================

    /// 启用正确性校验: 立即对每个校验器采集基线
    ///
    /// 须在 import 之前调用
    pub async fn enable_correctness_check(
        &mut self,
        checkers: Vec<Box<dyn CorrectnessChecker>>,
    ) -> ImportResult<()> {
        for mut checker in checkers {
            checker.pre_collect(self.store.as_ref()).await?;
            debug!(checker = checker.name(), "基线采集完成");
            self.correctness.push(checker);
        }
        Ok(())
    }

    /// 依次执行正确性校验，首个不符即返回
    pub async fn check_correct(&self) -> ImportResult<()> {
        for checker in &self.correctness {
            checker.check_correct(self.store.as_ref()).await?;
            debug!(checker = checker.name(), "正确性校验通过");
        }
        Ok(())
    }

    // ==========================================
    // 一次性执行
    // ==========================================

    /// 依次执行全部阶段；失败时仍会落盘失败明细
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn run(&mut self, matrix: CellMatrix) -> ImportResult<ImportReport> {
        let result = self.run_stages(matrix).await;
        if result.is_err() {
            if let Err(e) = self.recorder.flush() {
                warn!(error = %e, "失败明细落盘失败");
            }
        }
        result
    }

    async fn run_stages(&mut self, matrix: CellMatrix) -> ImportResult<ImportReport> {
        let mut whole = self.parse(matrix)?;
        self.check(&whole)?;
        self.import(&mut whole).await?;
        self.post_handle().await?;
        self.check_correct().await?;
        Ok(self.report(whole.len()))
    }

    /// 读取表格文件并执行全部阶段
    pub async fn run_file(
        &mut self,
        source: &dyn TabularSource,
        path: &Path,
    ) -> ImportResult<ImportReport> {
        info!(run_id = %self.run_id, path = %path.display(), "开始导入文件");
        let matrix = source.read(path)?;
        self.run(matrix).await
    }

    pub fn report(&self, units: usize) -> ImportReport {
        ImportReport {
            run_id: self.run_id.clone(),
            units,
            progress: self.progress.snapshot(),
            check_failures: self.recorder.check_failures().len(),
            import_failures: self.recorder.import_failures().len(),
        }
    }
}
